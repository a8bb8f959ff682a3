//! Fuzz-style property tests for the wire codec.
//!
//! These tests validate that the frame decoder handles arbitrary network
//! input gracefully without crashing.

use proptest::prelude::*;
use quarry_core::BlockPos;
use quarry_net::{
    decode_clientbound, decode_serverbound, encode_clientbound, encode_serverbound, Clientbound,
    DigActionKind, Phase, Serverbound, SlotData,
};

proptest! {
    /// Property: Arbitrary bytes don't crash the clientbound decoder
    #[test]
    fn arbitrary_bytes_dont_crash_clientbound(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        for phase in [Phase::Handshake, Phase::Login, Phase::Play] {
            let _result = decode_clientbound(&random_bytes, phase);
            // No panic = success
        }
    }

    /// Property: Arbitrary bytes don't crash the serverbound decoder
    #[test]
    fn arbitrary_bytes_dont_crash_serverbound(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        for phase in [Phase::Handshake, Phase::Login, Phase::Play] {
            let _result = decode_serverbound(&random_bytes, phase);
        }
    }

    /// Property: Handshakes roundtrip
    #[test]
    fn handshake_roundtrips(
        protocol_version in any::<u16>(),
        schema_hash in any::<u64>(),
    ) {
        let packet = Serverbound::Handshake { protocol_version, schema_hash };
        let frame = encode_serverbound(&packet);
        let (decoded, consumed) = decode_serverbound(&frame, Phase::Handshake)
            .unwrap()
            .unwrap();
        prop_assert_eq!(decoded, packet);
        prop_assert_eq!(consumed, frame.len());
    }

    /// Property: Dig actions roundtrip for every stage and position
    #[test]
    fn dig_action_roundtrips(
        stage in 0u8..3,
        x in any::<i32>(),
        y in any::<i32>(),
        z in any::<i32>(),
    ) {
        let packet = Serverbound::DigAction {
            action: DigActionKind::try_from(stage).unwrap(),
            pos: BlockPos::new(x, y, z),
        };
        let frame = encode_serverbound(&packet);
        let (decoded, _) = decode_serverbound(&frame, Phase::Play).unwrap().unwrap();
        prop_assert_eq!(decoded, packet);
    }

    /// Property: Block changes roundtrip
    #[test]
    fn block_change_roundtrips(
        x in any::<i32>(),
        y in any::<i32>(),
        z in any::<i32>(),
        block in any::<u16>(),
        state in any::<u16>(),
    ) {
        let packet = Clientbound::BlockChange {
            pos: BlockPos::new(x, y, z),
            block,
            state,
        };
        let frame = encode_clientbound(&packet);
        let (decoded, _) = decode_clientbound(&frame, Phase::Play).unwrap().unwrap();
        prop_assert_eq!(decoded, packet);
    }

    /// Property: Slot updates roundtrip, with and without items
    #[test]
    fn set_slot_roundtrips(
        index in any::<u16>(),
        has_item in any::<bool>(),
        count in any::<u8>(),
        durability in any::<u32>(),
    ) {
        let packet = Clientbound::SetSlot {
            slot: SlotData {
                index,
                item: has_item.then(|| "wooden_pickaxe".to_string()),
                count,
                durability,
            },
        };
        let frame = encode_clientbound(&packet);
        let (decoded, _) = decode_clientbound(&frame, Phase::Play).unwrap().unwrap();
        prop_assert_eq!(decoded, packet);
    }

    /// Property: Truncated frames report need-more-data or fail cleanly
    #[test]
    fn truncated_frames_handled(
        truncate_at in 0usize..50,
    ) {
        let packet = Clientbound::LoginSuccess {
            session_id: 0x1234_5678,
            username: "digger".to_string(),
        };
        let frame = encode_clientbound(&packet);

        if truncate_at < frame.len() {
            let result = decode_clientbound(&frame[..truncate_at], Phase::Login);
            // A strict prefix of a valid frame is never a complete packet.
            prop_assert!(matches!(result, Ok(None)));
        }
    }

    /// Property: Corrupted payload bytes never panic the decoder
    #[test]
    fn corrupted_payload_handled(
        flip_pos in 0usize..30,
        flip_bit in 0u8..8,
    ) {
        let packet = Clientbound::LoginSuccess {
            session_id: 0xDEAD_BEEF,
            username: "digger".to_string(),
        };
        let mut frame = encode_clientbound(&packet);

        if flip_pos < frame.len() {
            frame[flip_pos] ^= 1 << flip_bit;
            let _result = decode_clientbound(&frame, Phase::Login);
            // May succeed or fail - just shouldn't panic
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn empty_buffer_needs_more_data() {
        assert!(matches!(decode_clientbound(&[], Phase::Play), Ok(None)));
        assert!(matches!(decode_serverbound(&[], Phase::Play), Ok(None)));
    }

    #[test]
    fn valid_roundtrip() {
        let packet = Serverbound::KeepAlive { id: 0x123 };
        let frame = encode_serverbound(&packet);
        let (decoded, _) = decode_serverbound(&frame, Phase::Play)
            .expect("decode ok")
            .expect("complete frame");
        assert_eq!(decoded, packet);
    }
}
