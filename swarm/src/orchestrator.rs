//! Swarm orchestration: connecting, supervising and reconnecting agents
//!
//! The orchestrator owns every agent for the lifetime of the process. Agents
//! that finish connecting are pushed into a bounded handoff queue; the
//! supervision loop drains that queue and gives each agent two tasks:
//!
//! - the receive loop ([`Agent::run_receive_loop`]),
//! - an update loop that ticks the agent, steers it toward the rally point and
//!   records activity.
//!
//! When an agent drops, its update loop waits for the receive loop to finish
//! cleaning up, then reconnects it through the same path, which puts it back
//! into the queue. The swarm stops once no agent has shown activity for the
//! configured idle window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

use crate::agent::Agent;
use crate::config::SwarmSettings;
use crate::handlers::HandlerRegistry;
use crate::proxy::ProxyRoute;

/// How often the supervision loop looks at the handoff queue when it is empty.
const HANDOFF_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time of the most recent activity anywhere in the swarm.
#[derive(Debug)]
pub struct ActivityClock {
    last_activity: Mutex<Instant>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a connection or supervision task needs, cheap to clone.
#[derive(Clone)]
struct SwarmContext {
    settings: Arc<SwarmSettings>,
    registry: Arc<HandlerRegistry>,
    activity: Arc<ActivityClock>,
    handoff: mpsc::Sender<Arc<Agent>>,
}

impl SwarmContext {
    /// Connects `agent` and queues it for supervision. Returns whether it connected.
    async fn connect_and_handoff(&self, agent: Arc<Agent>) -> bool {
        let server = &self.settings.server_address;
        if let Err(e) = agent.connect(server, self.settings.handshake_timeout).await {
            error!("{}: failed to connect to server: {}", agent.nickname(), e);
            return false;
        }

        self.activity.touch().await;
        if self.handoff.send(agent).await.is_err() {
            warn!("Handoff queue closed, dropping connected agent");
            return false;
        }
        true
    }

    async fn supervise_agent(self, agent: Arc<Agent>) {
        let receiver = {
            let agent = Arc::clone(&agent);
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move { agent.run_receive_loop(&registry).await })
        };

        let (rally_x, rally_y) = self.settings.rally_point;
        let mut ticker = interval(self.settings.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        while agent.is_alive().await {
            agent.tick().await;
            agent.turn_toward(rally_x, rally_y).await;
            self.activity.touch().await;
            ticker.tick().await;
        }

        info!("{}: connection lost, reconnecting", agent.nickname());
        if let Err(e) = receiver.await {
            error!("{}: receive loop panicked: {}", agent.nickname(), e);
        }

        self.connect_and_handoff(agent).await;
    }
}

pub struct Swarm {
    settings: Arc<SwarmSettings>,
    registry: Arc<HandlerRegistry>,
    activity: Arc<ActivityClock>,
    agents: Vec<Arc<Agent>>,
    handoff_tx: mpsc::Sender<Arc<Agent>>,
    handoff_rx: mpsc::Receiver<Arc<Agent>>,
}

impl Swarm {
    pub fn new(settings: SwarmSettings, registry: HandlerRegistry) -> Self {
        let (handoff_tx, handoff_rx) = mpsc::channel(settings.handoff_capacity.max(1));
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            activity: Arc::new(ActivityClock::new()),
            agents: Vec::new(),
            handoff_tx,
            handoff_rx,
        }
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn activity(&self) -> &Arc<ActivityClock> {
        &self.activity
    }

    /// Creates `agents_per_proxy` agents for every route.
    pub fn initialize_agents(&mut self, routes: &[ProxyRoute]) {
        let per_route = self.settings.agents_per_proxy.max(1);
        self.agents = routes
            .iter()
            .flat_map(|route| (0..per_route).map(move |_| Arc::new(Agent::new(route.clone()))))
            .collect();
        self.fit_handoff_queue();

        info!(
            "Created {} agents over {} routes",
            self.agents.len(),
            routes.len()
        );
    }

    pub fn add_agent(&mut self, agent: Arc<Agent>) {
        self.agents.push(agent);
        self.fit_handoff_queue();
    }

    // Every connection attempt finishes before supervision starts draining
    // the queue, so it must hold one slot per agent.
    fn fit_handoff_queue(&mut self) {
        if self.agents.len() > self.handoff_tx.max_capacity() {
            let (handoff_tx, handoff_rx) = mpsc::channel(self.agents.len());
            self.handoff_tx = handoff_tx;
            self.handoff_rx = handoff_rx;
        }
    }

    fn context(&self) -> SwarmContext {
        SwarmContext {
            settings: Arc::clone(&self.settings),
            registry: Arc::clone(&self.registry),
            activity: Arc::clone(&self.activity),
            handoff: self.handoff_tx.clone(),
        }
    }

    /// Connects every agent in parallel and waits for all attempts.
    ///
    /// Returns how many agents connected.
    pub async fn start_connections(&self) -> usize {
        let mut attempts = JoinSet::new();
        for agent in &self.agents {
            let context = self.context();
            let agent = Arc::clone(agent);
            attempts.spawn(async move { context.connect_and_handoff(agent).await });
        }

        let mut connected = 0;
        while let Some(result) = attempts.join_next().await {
            match result {
                Ok(true) => connected += 1,
                Ok(false) => {}
                Err(e) => error!("Connection task failed: {}", e),
            }
        }

        info!("{}/{} agents connected", connected, self.agents.len());
        connected
    }

    /// Supervises handed-off agents until the swarm goes quiet.
    pub async fn supervise(&mut self) {
        let mut poll = interval(HANDOFF_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            match self.handoff_rx.try_recv() {
                Ok(agent) => {
                    tokio::spawn(self.context().supervise_agent(agent));
                }
                Err(TryRecvError::Empty) => {
                    let idle = self.activity.idle_for().await;
                    if idle > self.settings.idle_timeout {
                        info!("No agent activity for {:?}, stopping supervision", idle);
                        return;
                    }
                    poll.tick().await;
                }
                Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    pub async fn run(&mut self) {
        self.start_connections().await;
        self.supervise().await;
    }
}
