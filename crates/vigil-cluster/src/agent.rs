//! The agent loop.
//!
//! One `Agent` runs on every node: it probes the local node on a cadence,
//! fans `LocalStatus` calls out to the alive peers, folds everything into
//! the cluster verdict and commits it to the cache and store. The RPC
//! handlers answer from the cache only, so a slow peer or a failing disk
//! never blocks a status query.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vigil_health::{Registry, Reporter};
use vigil_state::{
    epoch_secs, MemberState, MemberStatus, NodeState, NodeStatus, StatusCache, StatusStore,
    SystemStatus,
};

use crate::aggregate::aggregate;
use crate::client::{default_dial_rpc, DialRpc};
use crate::config::{AgentConfig, Role, ROLE_TAG};
use crate::error::{ClusterError, ClusterResult};
use crate::membership::{run_membership, MemberCache, Membership};
use crate::server::AgentServer;

/// Bound on the shutdown drain window, per task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The cluster health agent.
pub struct Agent {
    config: AgentConfig,
    registry: Arc<Registry>,
    membership: Arc<dyn Membership>,
    store: StatusStore,
    cache: Arc<StatusCache>,
    members: Arc<MemberCache>,
    dial: DialRpc,
    bound_addrs: Vec<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Agent {
    /// Create an agent. Fails fast on configuration errors; the cache is
    /// seeded with an `Unknown` system view.
    pub fn new(
        config: AgentConfig,
        registry: Registry,
        membership: Arc<dyn Membership>,
        store: StatusStore,
    ) -> ClusterResult<Self> {
        config.validate()?;
        let cache = Arc::new(StatusCache::new(store.clone()));
        let dial = default_dial_rpc(config.rpc_port, config.rpc_call_timeout);
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            registry: Arc::new(registry),
            membership,
            store,
            cache,
            members: Arc::new(MemberCache::new()),
            dial,
            bound_addrs: Vec::new(),
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    /// Replace the peer dialer (tests redirect fan-out targets).
    pub fn with_dial_rpc(mut self, dial: DialRpc) -> Self {
        self.dial = dial;
        self
    }

    /// Shared handle to the status cache.
    pub fn cache(&self) -> Arc<StatusCache> {
        Arc::clone(&self.cache)
    }

    /// Addresses the RPC listeners are actually bound to.
    ///
    /// Populated by `start()`; useful when binding to port 0.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.bound_addrs
    }

    /// Join the cluster, bind the RPC listeners and spawn the worker
    /// tasks: tick, membership, eviction, and one server per listener.
    pub async fn start(&mut self) -> ClusterResult<()> {
        self.membership.join(&self.config.peers, false).await?;

        // Bind every listener up front so a bad address fails startup.
        let mut listeners = Vec::with_capacity(self.config.bind_addrs.len());
        for addr in &self.config.bind_addrs {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| ClusterError::Config(format!("bind {addr}: {e}")))?;
            if let Ok(local) = listener.local_addr() {
                self.bound_addrs.push(local);
            }
            listeners.push(listener);
        }

        // Seed the member cache before the first tick can run.
        match self.membership.members().await {
            Ok(members) => self.members.replace(members).await,
            Err(e) => warn!(error = %e, "initial membership snapshot failed"),
        }

        let shutdown_rx = self.shutdown_tx.subscribe();

        let server = AgentServer::new(
            self.config.name.clone(),
            Arc::clone(&self.cache),
            shutdown_rx.clone(),
        );
        self.tasks.extend(server.serve(listeners));

        self.tasks.push(tokio::spawn(run_membership(
            Arc::clone(&self.membership),
            Arc::clone(&self.members),
            shutdown_rx.clone(),
        )));

        self.tasks.push(tokio::spawn(
            self.store
                .clone()
                .run_eviction(self.config.retention, shutdown_rx.clone()),
        ));

        self.tasks.push(tokio::spawn(run_ticks(
            self.tick_context(),
            self.config.tick_interval,
            shutdown_rx,
        )));

        info!(
            name = %self.config.name,
            role = self.config.role.as_str(),
            listeners = self.bound_addrs.len(),
            "agent started"
        );
        Ok(())
    }

    /// Drive a single probe-and-aggregate pass outside the periodic loop.
    ///
    /// The periodic loop runs the same path; this entry point exists for
    /// embedders and tests that control their own cadence.
    pub async fn run_once(&self) -> SystemStatus {
        update_status(&self.tick_context()).await
    }

    /// Leave the cluster and stop all worker tasks, draining in-flight
    /// RPCs within a bounded window.
    pub async fn stop(&mut self) {
        if let Err(e) = self.membership.leave().await {
            warn!(error = %e, "membership leave failed");
        }
        let _ = self.shutdown_tx.send(true);

        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
                warn!("task did not stop within the shutdown window, aborting");
                task.abort();
            }
        }

        if let Err(e) = self.membership.close().await {
            warn!(error = %e, "membership close failed");
        }
        info!(name = %self.config.name, "agent stopped");
    }

    fn tick_context(&self) -> TickContext {
        TickContext {
            name: self.config.name.clone(),
            role: self.config.role,
            registry: Arc::clone(&self.registry),
            members: Arc::clone(&self.members),
            cache: Arc::clone(&self.cache),
            dial: Arc::clone(&self.dial),
            probe_deadline: self.config.tick_interval,
        }
    }
}

/// Everything one status update needs, shareable across tick tasks.
#[derive(Clone)]
struct TickContext {
    name: String,
    role: Role,
    registry: Arc<Registry>,
    members: Arc<MemberCache>,
    cache: Arc<StatusCache>,
    dial: DialRpc,
    probe_deadline: Duration,
}

/// Drive status updates on the configured cadence until shutdown.
async fn run_ticks(ctx: TickContext, tick_interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // The tick runs on its own task: a panic anywhere inside it
                // is contained here and the loop proceeds to the next tick.
                let tick_ctx = ctx.clone();
                let tick = tokio::spawn(async move { update_status(&tick_ctx).await });
                if let Err(e) = tick.await {
                    warn!(error = %e, "status update tick abandoned");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// One full status update: probe locally, fan out, aggregate, commit.
async fn update_status(ctx: &TickContext) -> SystemStatus {
    let captured_at = epoch_secs();

    // Run the local checkers against a fresh reporter.
    let mut reporter = Reporter::new(ctx.name.clone(), captured_at);
    ctx.registry.run_all(ctx.probe_deadline, &mut reporter).await;

    // Finalize the local node status against the current member snapshot.
    let members = ctx.members.snapshot().await;
    let local_member = members
        .iter()
        .find(|m| m.name == ctx.name)
        .cloned()
        .unwrap_or_else(|| local_member_fallback(ctx));
    let local = reporter.into_status(local_member);

    if let Err(e) = ctx.cache.update_node(local.clone()).await {
        warn!(error = %e, "failed to persist local node status");
    }

    // Fan out to every other alive member; members in any other state
    // contribute a placeholder carrying their member record.
    let mut nodes = vec![local];
    let mut queries = Vec::new();
    for member in members.into_iter().filter(|m| m.name != ctx.name) {
        if member.status == MemberState::Alive {
            let dial = Arc::clone(&ctx.dial);
            let peer = member.clone();
            queries.push((
                member,
                tokio::spawn(async move {
                    let mut client = dial(peer).await?;
                    client.local_status().await
                }),
            ));
        } else {
            nodes.push(unknown_placeholder(&member, captured_at));
        }
    }

    for (member, query) in queries {
        let status = match query.await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                debug!(peer = %member.name, error = %e, "peer status query failed");
                unknown_placeholder(&member, captured_at)
            }
            Err(e) => {
                warn!(peer = %member.name, error = %e, "peer status task failed");
                unknown_placeholder(&member, captured_at)
            }
        };
        nodes.push(status);
    }

    // Fold into the cluster verdict and commit it.
    let system = aggregate(nodes, captured_at);
    if let Err(e) = ctx.cache.update(system.clone()).await {
        warn!(error = %e, "failed to persist system status");
    }
    system
}

/// Placeholder for a peer that produced no status this tick.
fn unknown_placeholder(member: &MemberStatus, captured_at: u64) -> NodeStatus {
    NodeStatus {
        name: member.name.clone(),
        status: NodeState::Unknown,
        member: member.clone(),
        probes: Vec::new(),
        captured_at,
    }
}

/// Local member stand-in for ticks that run before the membership driver
/// has reported this node.
fn local_member_fallback(ctx: &TickContext) -> MemberStatus {
    MemberStatus {
        name: ctx.name.clone(),
        addr: String::new(),
        status: MemberState::Alive,
        tags: HashMap::from([(ROLE_TAG.to_string(), ctx.role.as_str().to_string())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vigil_health::Checker;
    use vigil_state::{Probe, ProbeStatus, SystemState};

    struct HealthyChecker(&'static str);

    #[async_trait]
    impl Checker for HealthyChecker {
        fn name(&self) -> &str {
            self.0
        }

        async fn check(&self, reporter: &mut Reporter) {
            reporter.add(Probe {
                checker: self.0.to_string(),
                status: ProbeStatus::Running,
                ..Default::default()
            });
        }
    }

    fn master_member(name: &str) -> MemberStatus {
        MemberStatus {
            name: name.to_string(),
            addr: "127.0.0.1".to_string(),
            status: MemberState::Alive,
            tags: HashMap::from([(ROLE_TAG.to_string(), "master".to_string())]),
        }
    }

    fn test_context(name: &str, role: Role) -> TickContext {
        let store = StatusStore::open_in_memory().unwrap();
        let mut registry = Registry::new();
        registry.add_checker(Box::new(HealthyChecker("svc")));
        TickContext {
            name: name.to_string(),
            role,
            registry: Arc::new(registry),
            members: Arc::new(MemberCache::new()),
            cache: Arc::new(StatusCache::new(store)),
            dial: default_dial_rpc(0, Duration::from_millis(100)),
            probe_deadline: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn update_status_without_members_uses_the_local_fallback() {
        let ctx = test_context("node-1", Role::Master);

        let system = update_status(&ctx).await;

        // The fallback member carries the configured role, so a lone
        // master aggregates as running.
        assert_eq!(system.status, SystemState::Running);
        assert_eq!(system.nodes.len(), 1);
        assert_eq!(system.nodes[0].name, "node-1");
        assert_eq!(system.nodes[0].member.status, MemberState::Alive);
    }

    #[tokio::test]
    async fn update_status_commits_to_the_cache() {
        let ctx = test_context("node-1", Role::Master);
        ctx.members.replace(vec![master_member("node-1")]).await;

        assert_eq!(ctx.cache.recent_status().await.status, SystemState::Unknown);
        update_status(&ctx).await;

        let cached = ctx.cache.recent_status().await;
        assert_eq!(cached.status, SystemState::Running);
        assert!(ctx.cache.recent_node_status("node-1").await.is_some());
    }

    #[tokio::test]
    async fn non_alive_member_becomes_a_placeholder_without_rpc() {
        let ctx = test_context("node-1", Role::Node);
        let mut failed = master_member("failed-master");
        failed.status = MemberState::Failed;
        ctx.members
            .replace(vec![master_member("node-1"), failed])
            .await;

        let system = update_status(&ctx).await;

        assert_eq!(system.nodes.len(), 2);
        let placeholder = &system.nodes[1];
        assert_eq!(placeholder.name, "failed-master");
        assert_eq!(placeholder.status, NodeState::Unknown);
        assert_eq!(placeholder.member.status, MemberState::Failed);
        // A failed member forces degradation.
        assert_eq!(system.status, SystemState::Degraded);
    }

    #[tokio::test]
    async fn captured_at_is_monotonic_across_updates() {
        let ctx = test_context("node-1", Role::Master);
        let first = update_status(&ctx).await;
        let second = update_status(&ctx).await;
        assert!(second.nodes[0].captured_at >= first.nodes[0].captured_at);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_loop_updates_the_cache_on_cadence() {
        let ctx = test_context("node-1", Role::Master);
        ctx.members.replace(vec![master_member("node-1")]).await;
        let cache = Arc::clone(&ctx.cache);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_task = tokio::spawn(run_ticks(ctx, Duration::from_secs(5), shutdown_rx));

        // The first interval tick fires as soon as the loop is polled.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if cache.recent_status().await.status != SystemState::Unknown {
                break;
            }
        }
        assert_eq!(cache.recent_status().await.status, SystemState::Running);

        shutdown_tx.send(true).unwrap();
        loop_task.await.unwrap();
    }
}
