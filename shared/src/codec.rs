//! Binary packet codec for the snake game protocol
//!
//! Inbound frames are plain byte sequences. Byte 2 is the opcode, bytes 3-4
//! carry the id of the entity the frame talks about, and the remaining layout
//! depends on the opcode. Outbound frames are tiny and mostly a single byte.

/// Minimum length of a frame that carries an opcode.
pub const MIN_FRAME_LEN: usize = 3;

/// Offset of the opcode in every inbound frame.
pub const OPCODE_OFFSET: usize = 2;

/// Offset of the big-endian entity id.
pub const ENTITY_ID_OFFSET: usize = 3;

/// Length of the decoded handshake secret.
pub const SECRET_LEN: usize = 24;

/// Offset of the first obfuscated secret character in the hello reply.
pub const SECRET_OFFSET: usize = 17;

/// Smallest hello reply that holds all 48 obfuscated characters.
pub const MIN_HELLO_LEN: usize = SECRET_OFFSET + SECRET_LEN * 2;

/// Inbound opcodes.
pub mod opcode {
    pub const HELLO: u8 = 54;
    pub const INIT: u8 = 97;
    pub const PING_REQUEST: u8 = 112;
    pub const KILL: u8 = 118;
    pub const FULL_STATE: u8 = 115;
    pub const ABSOLUTE_MOVE: u8 = 110;
    pub const ABSOLUTE_MOVE_ALT: u8 = 103;
    pub const RELATIVE_MOVE: u8 = 71;
    pub const RELATIVE_MOVE_ALT: u8 = 78;
}

/// First byte of outbound frames.
pub mod outbound {
    pub const HELLO: u8 = 99;
    pub const NICKNAME: u8 = 115;
    pub const NICKNAME_PROTOCOL: u8 = 10;
    pub const PONG: u8 = 251;
}

/// Returns the payload if it is long enough to carry an opcode.
pub fn decode_frame(raw: &[u8]) -> Option<&[u8]> {
    (raw.len() >= MIN_FRAME_LEN).then_some(raw)
}

pub fn decode_opcode(packet: &[u8]) -> Option<u8> {
    packet.get(OPCODE_OFFSET).copied()
}

/// Reads a big-endian u16 starting at `offset`.
pub fn decode_u16(packet: &[u8], offset: usize) -> Option<u16> {
    let bytes = packet.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a big-endian 24-bit value starting at `offset`.
pub fn decode_u24(packet: &[u8], offset: usize) -> Option<u32> {
    let bytes = packet.get(offset..offset + 3)?;
    Some(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
}

pub fn decode_entity_id(packet: &[u8]) -> Option<u16> {
    decode_u16(packet, ENTITY_ID_OFFSET)
}

/// Decodes the handshake secret carried by the hello reply.
///
/// The server hides a 24 character token in 48 letters starting at offset 17.
/// Every output character is built from two source letters, each shifted by a
/// slot-dependent amount, and then rotated by a running accumulator. The
/// server rejects the session if a single character is off, so the arithmetic
/// here (including the truncating remainder in the final rotation) must not
/// be "simplified".
pub fn decode_secret(packet: &[u8]) -> Option<[u8; SECRET_LEN]> {
    let source = packet.get(SECRET_OFFSET..MIN_HELLO_LEN)?;

    let mut secret = [0u8; SECRET_LEN];
    let mut accumulator: i64 = 0;

    for (index, pair) in source.chunks_exact(2).enumerate() {
        let slot = index as i64;
        let high = secret_nibble(normalize_char(pair[0]), 98, slot);
        let low = secret_nibble(normalize_char(pair[1]), 115, slot);

        let combined = (high << 4) | low;
        let base: i64 = if combined >= 97 { 97 } else { 65 };
        let value = combined - base;

        if index == 0 {
            accumulator = 2 + value;
        }

        secret[index] = ((value + accumulator) % 26 + base) as u8;
        accumulator += 3 + value;
    }

    Some(secret)
}

fn normalize_char(char_code: u8) -> i64 {
    let char_code = i64::from(char_code);
    if char_code <= 96 {
        char_code + 32
    } else {
        char_code
    }
}

fn secret_nibble(char_code: i64, shift: i64, slot: i64) -> i64 {
    (char_code - shift - slot * 34).rem_euclid(26)
}

pub fn encode_hello() -> Vec<u8> {
    vec![outbound::HELLO]
}

/// Builds the nickname announcement sent right after the decoded secret.
///
/// Names longer than 255 bytes are cut so the length prefix stays truthful.
pub fn encode_nickname(skin: u8, nickname: &str) -> Vec<u8> {
    let name = &nickname.as_bytes()[..nickname.len().min(u8::MAX as usize)];

    let mut frame = Vec::with_capacity(4 + name.len());
    frame.push(outbound::NICKNAME);
    frame.push(outbound::NICKNAME_PROTOCOL);
    frame.push(skin);
    frame.push(name.len() as u8);
    frame.extend_from_slice(name);
    frame
}

pub fn encode_ping() -> Vec<u8> {
    vec![outbound::PONG]
}

/// A heading update is the floored heading as a single byte.
pub fn encode_heading(heading: f64) -> Vec<u8> {
    vec![heading.floor().clamp(0.0, 255.0) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_reply(obfuscated: &[u8]) -> Vec<u8> {
        let mut packet = vec![0, 0, opcode::HELLO];
        packet.resize(SECRET_OFFSET, 0);
        packet.extend_from_slice(obfuscated);
        packet
    }

    #[test]
    fn test_decode_frame_rejects_short_payloads() {
        assert!(decode_frame(&[]).is_none());
        assert!(decode_frame(&[1, 2]).is_none());
        assert_eq!(decode_frame(&[1, 2, 3]), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_decode_opcode() {
        assert_eq!(decode_opcode(&[0, 0, opcode::KILL]), Some(118));
        assert_eq!(decode_opcode(&[0, 0]), None);
    }

    #[test]
    fn test_decode_entity_id_big_endian() {
        assert_eq!(decode_entity_id(&[0, 0, 115, 0x12, 0x34]), Some(0x1234));
        assert_eq!(decode_entity_id(&[0, 0, 115, 0x12]), None);
    }

    #[test]
    fn test_decode_u24() {
        let packet = [0, 0, 0, 0x01, 0x86, 0xA0];
        assert_eq!(decode_u24(&packet, 3), Some(100_000));
        assert_eq!(decode_u24(&packet, 4), None);
    }

    #[test]
    fn test_decode_secret_fixture() {
        let packet = hello_reply(b"qwertyuiopasdfghjklzxcvbnmQWERTYUIOPASDFGHJKLZXC");
        assert_eq!(packet.len(), 65);

        let secret = decode_secret(&packet).unwrap();
        assert_eq!(&secret, b"ktFpiyrImffsmgpBleunEibb");
    }

    #[test]
    fn test_decode_secret_second_fixture() {
        let packet = hello_reply(b"ahovcjqxelszgnubipwdkryfmtahovcjqxelszgnubipwdkr");

        let secret = decode_secret(&packet).unwrap();
        assert_eq!(&secret, b"oLqtuJqleLkxirOtwxMtohOn");
    }

    #[test]
    fn test_decode_secret_is_deterministic() {
        let packet = hello_reply(b"ahovcjqxelszgnubipwdkryfmtahovcjqxelszgnubipwdkr");
        assert_eq!(decode_secret(&packet), decode_secret(&packet));
    }

    #[test]
    fn test_decode_secret_case_is_collapsed() {
        let lower = hello_reply(b"qwertyuiopasdfghjklzxcvbnmqwertyuiopasdfghjklzxc");
        let upper = hello_reply(b"QWERTYUIOPASDFGHJKLZXCVBNMQWERTYUIOPASDFGHJKLZXC");
        assert_eq!(decode_secret(&lower), decode_secret(&upper));
    }

    #[test]
    fn test_decode_secret_short_packet() {
        let mut packet = hello_reply(b"ahovcjqxelszgnubipwdkryfmtahovcjqxelszgnubipwdkr");
        packet.pop();
        assert!(decode_secret(&packet).is_none());
    }

    #[test]
    fn test_decode_secret_output_is_ascii_letters_for_letter_input() {
        let packet = hello_reply(b"qwertyuiopasdfghjklzxcvbnmQWERTYUIOPASDFGHJKLZXC");
        let secret = decode_secret(&packet).unwrap();
        assert!(secret.iter().all(u8::is_ascii_alphabetic));
    }

    #[test]
    fn test_encode_nickname_layout() {
        let frame = encode_nickname(7, "Missile_42");
        assert_eq!(&frame[..4], &[115, 10, 7, 10]);
        assert_eq!(&frame[4..], b"Missile_42");
    }

    #[test]
    fn test_encode_nickname_truncates_long_names() {
        let name = "x".repeat(300);
        let frame = encode_nickname(0, &name);
        assert_eq!(frame[3], 255);
        assert_eq!(frame.len(), 4 + 255);
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(encode_hello(), vec![99]);
        assert_eq!(encode_ping(), vec![251]);
        assert_eq!(encode_heading(63.0), vec![63]);
        assert_eq!(encode_heading(249.9), vec![249]);
    }
}
