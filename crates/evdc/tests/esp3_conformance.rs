// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! ESP3 frame codec conformance: round trips, resynchronisation and CRC
//! strength over the public API.

use evdc::esp3::{Esp3Packet, FrameDecoder, PacketType};

/// The canonical CO_RD_VERSION request frame.
const CO_RD_VERSION_FRAME: [u8; 8] = [0x55, 0x00, 0x01, 0x00, 0x05, 0x70, 0x03, 0x09];

fn sample_packets() -> Vec<Esp3Packet> {
    let mut packets = Vec::new();
    // common command without parameters
    let mut version = Esp3Packet::new_command(PacketType::CommonCommand, 0x03, &[]);
    version.finalize();
    packets.push(version);
    // radio telegram, 4BS
    let mut radio = Esp3Packet::new();
    radio.init_for_rorg(0xA5, 0);
    radio.set_fourbs_data(0x1234_5608);
    radio.set_radio_sender(0x0102_0304);
    radio.set_radio_destination(0xFFFF_FFFF);
    radio.finalize();
    packets.push(radio);
    // smart-ack command with parameter bytes
    let mut smart_ack =
        Esp3Packet::new_command(PacketType::SmartAckCommand, 0x01, &[1, 0, 0, 0, 0x27, 0x10]);
    smart_ack.finalize();
    packets.push(smart_ack);
    // VLD radio telegram (trailing CRC byte inside the data)
    let mut vld = Esp3Packet::new();
    vld.init_for_rorg(0xD2, 3);
    vld.radio_user_data_mut().copy_from_slice(&[0x04, 0x60, 0x64]);
    vld.set_radio_sender(0x0506_0708);
    vld.finalize();
    packets.push(vld);
    packets
}

#[test]
fn encode_decode_round_trip_byte_by_byte() {
    let packets = sample_packets();
    let mut stream = Vec::new();
    for packet in &packets {
        stream.extend_from_slice(&packet.wire_bytes());
    }
    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    for byte in stream {
        decoder.push_bytes(&[byte], &mut decoded);
    }
    assert_eq!(decoded, packets);
}

#[test]
fn embedded_packets_survive_arbitrary_noise() {
    let packets = sample_packets();
    let mut stream = vec![0xDE, 0xAD, 0x55, 0x55, 0x00];
    for packet in &packets {
        stream.extend_from_slice(&packet.wire_bytes());
        stream.extend_from_slice(&[0x00, 0x55, 0x99, 0x42]);
    }
    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    decoder.push_bytes(&stream, &mut decoded);
    assert_eq!(decoded, packets);
}

#[test]
fn any_single_bit_flip_in_header_rejects_the_packet() {
    let reference = sample_packets();
    let frame = reference[1].wire_bytes();
    for bit in 0..40 {
        let mut corrupted = frame.clone();
        corrupted[1 + bit / 8] ^= 1 << (bit % 8);
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        decoder.push_bytes(&corrupted, &mut decoded);
        assert!(
            decoded.is_empty(),
            "header bit {} flip produced a packet",
            bit
        );
    }
}

#[test]
fn payload_bit_flips_reject_but_decoder_recovers() {
    let reference = sample_packets();
    let frame = reference[1].wire_bytes();
    let payload_bits = (frame.len() - 6) * 8;
    for bit in (0..payload_bits).step_by(7) {
        let mut corrupted = frame.clone();
        corrupted[6 + bit / 8] ^= 1 << (bit % 8);
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        decoder.push_bytes(&corrupted, &mut decoded);
        assert!(decoded.is_empty(), "payload bit {} flip slipped through", bit);
        // the very next well-formed frame must decode
        decoder.push_bytes(&frame, &mut decoded);
        assert_eq!(decoded.len(), 1, "decoder stuck after payload corruption");
    }
}

#[test]
fn literal_co_rd_version_frame_decodes() {
    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    decoder.push_bytes(&CO_RD_VERSION_FRAME, &mut decoded);
    assert_eq!(decoded.len(), 1);
    let packet = &decoded[0];
    assert_eq!(packet.packet_type(), Some(PacketType::CommonCommand));
    assert_eq!(packet.data_length(), 1);
    assert_eq!(packet.opt_data_length(), 0);
    assert_eq!(packet.data()[0], 0x03);
    // and our own encoder reproduces the same bytes
    let mut rebuilt = Esp3Packet::new_command(PacketType::CommonCommand, 0x03, &[]);
    rebuilt.finalize();
    assert_eq!(rebuilt.wire_bytes(), CO_RD_VERSION_FRAME);
}

#[test]
fn split_chunks_at_every_boundary() {
    let packets = sample_packets();
    let frame = packets[1].wire_bytes();
    for split in 1..frame.len() {
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        decoder.push_bytes(&frame[..split], &mut decoded);
        decoder.push_bytes(&frame[split..], &mut decoded);
        assert_eq!(decoded.len(), 1, "split at {} failed", split);
        assert_eq!(&decoded[0], &packets[1]);
    }
}
