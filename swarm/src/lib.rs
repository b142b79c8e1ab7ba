//! # Missile Swarm Library
//!
//! This library drives a swarm of simulated snake game clients ("agents"). Each
//! agent holds its own websocket connection to the game server, answers the
//! handshake, keeps a local mirror of its snake and sends steering and keepalive
//! frames so the server treats it as a live player.
//!
//! ## Architecture Overview
//!
//! ### Actor Per Connection
//! Every agent is independent. Once connected it runs two cooperating tasks: a
//! receive loop that decodes inbound packets and an update loop that ticks the
//! agent on a fixed cadence. The two share nothing but the agent's own locked
//! state, so one slow or broken connection never stalls the rest of the swarm.
//!
//! ### Reconnection
//! Connections drop all the time: proxies die, the server kills snakes. A
//! dropped agent is reconnected through the same path it first connected with
//! and put back under supervision. When the whole swarm has been silent for the
//! idle window the orchestrator gives up.
//!
//! ## Module Organization
//!
//! ### Agent Module (`agent`)
//! - Per-agent state machine and locally mirrored snake state
//! - Receive loop with guaranteed cleanup
//! - Heading and keepalive cadence
//! - Dead reckoning between authoritative position packets
//!
//! ### Handlers Module (`handlers`)
//! Opcode to handler table built once at startup. Handlers mutate the agent's
//! state and return the frames to send back.
//!
//! ### Orchestrator Module (`orchestrator`)
//! - Parallel connection of every agent
//! - Bounded handoff queue between connecting and supervision
//! - Per-agent supervision and reconnection
//! - Global idle shutdown
//!
//! ### Network Module (`network`)
//! Websocket dialing with a browser-like header set, directly or through an
//! HTTP `CONNECT` tunnel, under one handshake timeout.
//!
//! ### Proxy and Config Modules (`proxy`, `config`)
//! Proxy string parsing, the JSON properties file and the proxy list.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use swarm::config::Properties;
//! use swarm::handlers::HandlerRegistry;
//! use swarm::orchestrator::Swarm;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let properties = Properties::load(Path::new("swarm.json"))?;
//!     let routes = properties.read_proxy_list()?;
//!
//!     let mut swarm = Swarm::new(properties.swarm_settings(), HandlerRegistry::standard());
//!     swarm.initialize_agents(&routes);
//!
//!     // Connects everything, then supervises until the swarm goes quiet.
//!     swarm.run().await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod network;
pub mod orchestrator;
pub mod proxy;
