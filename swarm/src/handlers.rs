//! Opcode handlers for inbound game packets
//!
//! The registry is built once with [`HandlerRegistry::standard`] and shared
//! read-only by every agent. A handler runs with the agent's state lock held
//! for the duration of one packet, so it must not block; anything it wants
//! sent goes back to the receive loop as a list of frames.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, trace};
use rand::Rng;
use shared::{
    decode_entity_id, decode_opcode, decode_secret, decode_u16, decode_u24, encode_nickname, opcode,
};

use crate::agent::AgentState;

/// Full-state packets shorter than this carry no usable speed or position.
pub const FULL_STATE_MIN_LEN: usize = 31;

/// Full-state positions at or below this are treated as garbage.
pub const POSITION_SANITY_THRESHOLD: u32 = 99;

const SPEED_OFFSET: usize = 12;
const POSITION_X_OFFSET: usize = 18;
const POSITION_Y_OFFSET: usize = 21;
const POSITION_SCALE: u32 = 5;
const MOVE_X_OFFSET: usize = 5;
const MOVE_Y_OFFSET: usize = 7;
const DELTA_X_OFFSET: usize = 5;
const DELTA_Y_OFFSET: usize = 6;
const DELTA_BIAS: i32 = 128;
const SKIN_COUNT: u8 = 42;

/// One inbound packet as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub payload: &'a [u8],
    pub nickname: &'a str,
    /// When the receive loop read the message.
    pub received_at: Instant,
}

/// Mutates the agent and returns the frames to send back, in order.
pub type Handler = fn(&mut AgentState, &Inbound<'_>) -> Vec<Vec<u8>>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u8, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every handler the swarm needs.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(&[opcode::HELLO], on_hello);
        registry.register(&[opcode::INIT], on_init);
        registry.register(&[opcode::PING_REQUEST], on_ping_request);
        registry.register(&[opcode::KILL], on_kill);
        registry.register(&[opcode::FULL_STATE], on_full_state);
        registry.register(
            &[opcode::ABSOLUTE_MOVE, opcode::ABSOLUTE_MOVE_ALT],
            on_absolute_move,
        );
        registry.register(
            &[opcode::RELATIVE_MOVE, opcode::RELATIVE_MOVE_ALT],
            on_relative_move,
        );
        registry
    }

    pub fn register(&mut self, opcodes: &[u8], handler: Handler) {
        for &opcode in opcodes {
            self.handlers.insert(opcode, handler);
        }
    }

    pub fn handles(&self, opcode: u8) -> bool {
        self.handlers.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler registered for the packet's opcode.
    ///
    /// Unknown opcodes are expected and produce nothing.
    pub fn dispatch(&self, state: &mut AgentState, inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
        let Some(opcode) = decode_opcode(inbound.payload) else {
            return Vec::new();
        };

        match self.handlers.get(&opcode) {
            Some(handler) => handler(state, inbound),
            None => {
                trace!("{}: no handler for opcode {}", inbound.nickname, opcode);
                Vec::new()
            }
        }
    }
}

fn on_hello(_state: &mut AgentState, inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
    debug!("{}: received HELLO packet", inbound.nickname);

    let Some(secret) = decode_secret(inbound.payload) else {
        debug!(
            "{}: HELLO packet too short for the secret ({} bytes)",
            inbound.nickname,
            inbound.payload.len()
        );
        return Vec::new();
    };

    let skin = rand::thread_rng().gen_range(0..SKIN_COUNT);
    vec![secret.to_vec(), encode_nickname(skin, inbound.nickname)]
}

fn on_init(state: &mut AgentState, inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
    debug!("{}: received INIT packet", inbound.nickname);
    state.initialized = true;
    state.needs_ping = true;
    Vec::new()
}

fn on_ping_request(state: &mut AgentState, _inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
    state.needs_ping = true;
    Vec::new()
}

fn on_kill(state: &mut AgentState, inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
    debug!("{}: killed by the server", inbound.nickname);
    state.connected = false;
    state.dead = true;
    Vec::new()
}

fn on_full_state(state: &mut AgentState, inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
    let payload = inbound.payload;
    let Some(entity_id) = decode_entity_id(payload) else {
        return Vec::new();
    };

    if state.entity_id == 0 {
        state.entity_id = entity_id;
    }
    if state.entity_id != entity_id || payload.len() < FULL_STATE_MIN_LEN {
        return Vec::new();
    }

    if let Some(speed) = decode_u16(payload, SPEED_OFFSET) {
        state.speed = i64::from(speed / 1000);
    }

    let x = decode_u24(payload, POSITION_X_OFFSET).map(|x| x / POSITION_SCALE);
    let y = decode_u24(payload, POSITION_Y_OFFSET).map(|y| y / POSITION_SCALE);
    if let (Some(x), Some(y)) = (x, y) {
        if x > POSITION_SANITY_THRESHOLD || y > POSITION_SANITY_THRESHOLD {
            state.position = (x as i32, y as i32);
        }
    }

    Vec::new()
}

fn is_own_entity(state: &AgentState, payload: &[u8]) -> bool {
    decode_entity_id(payload) == Some(state.entity_id)
}

fn on_absolute_move(state: &mut AgentState, inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
    let payload = inbound.payload;
    if !is_own_entity(state, payload) {
        return Vec::new();
    }
    let (Some(x), Some(y)) = (
        decode_u16(payload, MOVE_X_OFFSET),
        decode_u16(payload, MOVE_Y_OFFSET),
    ) else {
        return Vec::new();
    };

    state.dead_reckon(inbound.received_at);
    state.position = (i32::from(x), i32::from(y));
    state.record_reception(inbound.received_at);
    Vec::new()
}

fn on_relative_move(state: &mut AgentState, inbound: &Inbound<'_>) -> Vec<Vec<u8>> {
    let payload = inbound.payload;
    if !is_own_entity(state, payload) {
        return Vec::new();
    }
    let (Some(&dx), Some(&dy)) = (payload.get(DELTA_X_OFFSET), payload.get(DELTA_Y_OFFSET)) else {
        return Vec::new();
    };

    state.dead_reckon(inbound.received_at);
    state.position.0 += i32::from(dx) - DELTA_BIAS;
    state.position.1 += i32::from(dy) - DELTA_BIAS;
    state.record_reception(inbound.received_at);
    Vec::new()
}
