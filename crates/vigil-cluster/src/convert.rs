//! Conversions between domain status types and their protobuf mirrors.
//!
//! The wire types are generated by `tonic-build`; the agent keeps its own
//! domain model so storage and aggregation never depend on prost types.

use vigil_state::{
    MemberState, MemberStatus, NodeState, NodeStatus, Probe, ProbeStatus, SystemState,
    SystemStatus,
};

use crate::proto;

// ── Domain → proto ─────────────────────────────────────────────────

pub fn system_to_proto(status: &SystemStatus) -> proto::SystemStatus {
    proto::SystemStatus {
        status: system_state_to_proto(status.status) as i32,
        nodes: status.nodes.iter().map(node_to_proto).collect(),
        summary: status.summary.clone(),
        timestamp: status.timestamp,
    }
}

pub fn node_to_proto(status: &NodeStatus) -> proto::NodeStatus {
    proto::NodeStatus {
        name: status.name.clone(),
        status: node_state_to_proto(status.status) as i32,
        member: Some(member_to_proto(&status.member)),
        probes: status.probes.iter().map(probe_to_proto).collect(),
        captured_at: status.captured_at,
    }
}

pub fn member_to_proto(member: &MemberStatus) -> proto::MemberStatus {
    proto::MemberStatus {
        name: member.name.clone(),
        addr: member.addr.clone(),
        status: member_state_to_proto(member.status) as i32,
        tags: member.tags.clone(),
    }
}

pub fn probe_to_proto(probe: &Probe) -> proto::Probe {
    proto::Probe {
        checker: probe.checker.clone(),
        status: probe_status_to_proto(probe.status) as i32,
        error: probe.error.clone(),
        detail: probe.detail.clone(),
        extra: probe.extra.clone(),
        captured_at: probe.captured_at,
    }
}

fn system_state_to_proto(state: SystemState) -> proto::system_status::Type {
    match state {
        SystemState::Unknown => proto::system_status::Type::Unknown,
        SystemState::Running => proto::system_status::Type::Running,
        SystemState::Degraded => proto::system_status::Type::Degraded,
    }
}

fn node_state_to_proto(state: NodeState) -> proto::node_status::Type {
    match state {
        NodeState::Unknown => proto::node_status::Type::Unknown,
        NodeState::Running => proto::node_status::Type::Running,
        NodeState::Degraded => proto::node_status::Type::Degraded,
    }
}

fn member_state_to_proto(state: MemberState) -> proto::member_status::Type {
    match state {
        MemberState::None => proto::member_status::Type::None,
        MemberState::Alive => proto::member_status::Type::Alive,
        MemberState::Leaving => proto::member_status::Type::Leaving,
        MemberState::Left => proto::member_status::Type::Left,
        MemberState::Failed => proto::member_status::Type::Failed,
    }
}

fn probe_status_to_proto(status: ProbeStatus) -> proto::probe::Type {
    match status {
        ProbeStatus::Unknown => proto::probe::Type::Unknown,
        ProbeStatus::Running => proto::probe::Type::Running,
        ProbeStatus::Failed => proto::probe::Type::Failed,
        ProbeStatus::Terminated => proto::probe::Type::Terminated,
    }
}

// ── Proto → domain ─────────────────────────────────────────────────

pub fn system_from_proto(status: proto::SystemStatus) -> SystemStatus {
    let state = status.status();
    SystemStatus {
        status: system_state_from_proto(state),
        nodes: status.nodes.into_iter().map(node_from_proto).collect(),
        summary: status.summary,
        timestamp: status.timestamp,
    }
}

pub fn node_from_proto(status: proto::NodeStatus) -> NodeStatus {
    let state = status.status();
    NodeStatus {
        name: status.name,
        status: node_state_from_proto(state),
        member: status.member.map(member_from_proto).unwrap_or_default(),
        probes: status.probes.into_iter().map(probe_from_proto).collect(),
        captured_at: status.captured_at,
    }
}

pub fn member_from_proto(member: proto::MemberStatus) -> MemberStatus {
    let state = member.status();
    MemberStatus {
        name: member.name,
        addr: member.addr,
        status: member_state_from_proto(state),
        tags: member.tags,
    }
}

pub fn probe_from_proto(probe: proto::Probe) -> Probe {
    let status = probe.status();
    Probe {
        checker: probe.checker,
        status: probe_status_from_proto(status),
        error: probe.error,
        detail: probe.detail,
        extra: probe.extra,
        captured_at: probe.captured_at,
    }
}

fn system_state_from_proto(state: proto::system_status::Type) -> SystemState {
    match state {
        proto::system_status::Type::Unknown => SystemState::Unknown,
        proto::system_status::Type::Running => SystemState::Running,
        proto::system_status::Type::Degraded => SystemState::Degraded,
    }
}

fn node_state_from_proto(state: proto::node_status::Type) -> NodeState {
    match state {
        proto::node_status::Type::Unknown => NodeState::Unknown,
        proto::node_status::Type::Running => NodeState::Running,
        proto::node_status::Type::Degraded => NodeState::Degraded,
    }
}

fn member_state_from_proto(state: proto::member_status::Type) -> MemberState {
    match state {
        proto::member_status::Type::None => MemberState::None,
        proto::member_status::Type::Alive => MemberState::Alive,
        proto::member_status::Type::Leaving => MemberState::Leaving,
        proto::member_status::Type::Left => MemberState::Left,
        proto::member_status::Type::Failed => MemberState::Failed,
    }
}

fn probe_status_from_proto(status: proto::probe::Type) -> ProbeStatus {
    match status {
        proto::probe::Type::Unknown => ProbeStatus::Unknown,
        proto::probe::Type::Running => ProbeStatus::Running,
        proto::probe::Type::Failed => ProbeStatus::Failed,
        proto::probe::Type::Terminated => ProbeStatus::Terminated,
    }
}
