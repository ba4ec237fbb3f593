//! Basic usage example for the HSMS wire codec.

use bytes::BytesMut;
use hsms_wire::{DataItem, DataItemBuilder, DataMessage, FrameDecoder, ItemFormat, Message};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== HSMS Wire Example ===\n");

    // 1. Build an S1F13 establish-communications request
    println!("1. Building S1F13 W...");
    let items = vec![DataItem::list(vec![
        DataItem::text("MDLN-01")?,
        DataItemBuilder::new()
            .format(ItemFormat::Ascii)
            .size(6)
            .text("1.0")
            .build()?,
    ])?];
    let msg = Message::data(1, 0, DataMessage::new(1, 13, true, items)?)?;
    let encoded = msg.encode();
    println!("   {}", msg);
    println!("   Encoded size: {} bytes", encoded.len());

    // 2. Decode it from a stream buffer, split in two reads
    println!("\n2. Decoding from a split stream...");
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::from(&encoded[..7]);
    assert!(decoder.decode(&mut buf)?.is_none());
    buf.extend_from_slice(&encoded[7..]);

    if let Some(decoded) = decoder.decode(&mut buf)? {
        println!("   Decoded: {}", decoded);
        println!("   Same message: {}", decoded == msg);
    }

    // 3. Answer it
    println!("\n3. Building the S1F14 reply...");
    let reply = Message::reply_to(&msg, vec![DataItem::binary(1, &[0])?])?;
    println!("   {}", reply);

    // 4. Control messages
    println!("\n4. Control messages...");
    let select = Message::select_req(1, 0);
    println!("   {} -> {:02x?}", select, &select.encode()[..]);

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
