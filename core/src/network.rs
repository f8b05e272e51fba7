//! The network topology: systems (nodes), wires (connections) and the
//! edits a player may make to them.
//!
//! Every edit is compute-then-commit: it runs against a scratch copy of
//! the network and only replaces the live one once every check passes.

use crate::{
    config::{GeometryConfig, LevelDescriptor, NodeSpec},
    error::EditError,
    geometry::{self, Point, Rect},
    packet::PacketKind,
    types::{ConnectionId, NodeId, PacketId, VirtualTime},
    wire_budget::WireBudget,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a node does to packets that reach it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    #[default]
    #[serde(alias = "basic", alias = "normal")]
    Plain,
    Spy,
    Sabotage,
    Vpn,
    #[serde(alias = "antitrojan")]
    AntiTrojan,
    Distribute,
    Merge,
    Malicious,
    Controllable,
    Uncontrollable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSide {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Point,
    pub inputs: Vec<PacketKind>,
    pub outputs: Vec<PacketKind>,
    pub behavior: Behavior,
    pub damaged_since: Option<VirtualTime>,
    /// Last time an anti-trojan node cleaned a packet.
    pub last_sweep_at: Option<VirtualTime>,
    /// Bit fragments held by a merge node, counted per parent packet.
    pub merge_buffer: BTreeMap<PacketId, u32>,
    /// Input ports that already have a wire.
    pub connected_inputs: BTreeSet<usize>,
}

impl Node {
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            id: spec.id.clone(),
            position: Point::new(spec.x, spec.y),
            inputs: spec.inputs.clone(),
            outputs: spec.outputs.clone(),
            behavior: spec.behavior,
            damaged_since: None,
            last_sweep_at: None,
            merge_buffer: BTreeMap::new(),
            connected_inputs: BTreeSet::new(),
        }
    }

    pub fn port_position(&self, side: PortSide, index: usize, geometry: &GeometryConfig) -> Point {
        let half = geometry.node_size / 2.0;
        let count = match side {
            PortSide::Input => self.inputs.len(),
            PortSide::Output => self.outputs.len(),
        };
        let y = self.position.y - half
            + (index as f64 + 1.0) * geometry.node_size / (count as f64 + 1.0);
        let x = match side {
            PortSide::Input => self.position.x - half - geometry.port_offset,
            PortSide::Output => self.position.x + half + geometry.port_offset,
        };
        Point::new(x, y)
    }

    pub fn bounds(&self, geometry: &GeometryConfig) -> Rect {
        Rect::centered(self.position, geometry.node_size)
    }

    /// Damage is a window starting at `damaged_since`; it heals on its own.
    pub fn is_damaged(&self, now: VirtualTime, damage_ms: i64) -> bool {
        self.damaged_since
            .is_some_and(|since| since <= now && now < since + damage_ms)
    }

    pub fn sweep_ready(&self, now: VirtualTime, cooldown_ms: i64) -> bool {
        match self.last_sweep_at {
            None => true,
            Some(at) => now < at || now - at >= cooldown_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BendPoint {
    pub position: Point,
    /// Furthest a single move may carry the point.
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: NodeId,
    pub from_port: usize,
    pub to: NodeId,
    pub to_port: usize,
    pub waypoints: Vec<Point>,
    pub bend_points: Vec<BendPoint>,
    pub bulky_passes: u32,
    pub destroyed: bool,
}

impl Connection {
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.from == node || &self.to == node
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    geometry: GeometryConfig,
    budget: WireBudget,
    origin: NodeId,
    sink: NodeId,
    nodes: BTreeMap<NodeId, Node>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_connection: u32,
}

impl Network {
    pub fn from_level(level: &LevelDescriptor, geometry: &GeometryConfig) -> Self {
        Self {
            geometry: geometry.clone(),
            budget: WireBudget::new(level.wire_ceiling),
            origin: level.origin.clone(),
            sink: level.sink.clone(),
            nodes: level
                .nodes
                .iter()
                .map(|spec| (spec.id.clone(), Node::from_spec(spec)))
                .collect(),
            connections: BTreeMap::new(),
            next_connection: 0,
        }
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn origin(&self) -> &NodeId {
        &self.origin
    }

    pub fn sink(&self) -> &NodeId {
        &self.sink
    }

    pub fn geometry(&self) -> &GeometryConfig {
        &self.geometry
    }

    pub fn budget(&self) -> &WireBudget {
        &self.budget
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Wires leaving `node`, in creation order.
    pub fn outgoing(&self, node: &NodeId) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| &c.from == node)
            .map(|c| c.id)
            .collect()
    }

    /// Wires entering `node`, in creation order.
    pub fn incoming(&self, node: &NodeId) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| &c.to == node)
            .map(|c| c.id)
            .collect()
    }

    pub fn connection_into(&self, node: &NodeId, port: usize) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|c| &c.to == node && c.to_port == port)
            .map(|c| c.id)
    }

    /// Shapes of the two ports a wire joins: (source output, target input).
    pub fn port_shapes(&self, id: ConnectionId) -> Option<(Option<PacketKind>, Option<PacketKind>)> {
        let conn = self.connections.get(&id)?;
        let out = self.nodes.get(&conn.from)?.outputs.get(conn.from_port).copied();
        let inp = self.nodes.get(&conn.to)?.inputs.get(conn.to_port).copied();
        Some((out, inp))
    }

    // ── Path geometry ──────────────────────────────────────────

    /// Source port, raw waypoints, destination port. Bend points are left
    /// out; see `detailed_path`.
    pub fn path(&self, id: ConnectionId) -> Vec<Point> {
        let Some(conn) = self.connections.get(&id) else {
            return Vec::new();
        };
        let Some((start, end)) = self.port_ends(conn) else {
            return Vec::new();
        };
        let mut path = Vec::with_capacity(conn.waypoints.len() + 2);
        path.push(start);
        path.extend(conn.waypoints.iter().copied());
        path.push(end);
        path
    }

    /// Ordered polyline: source port, waypoints, bend points sorted along
    /// the port-to-port line, destination port.
    pub fn detailed_path(&self, id: ConnectionId) -> Vec<Point> {
        self.connections
            .get(&id)
            .map(|c| self.path_of(c))
            .unwrap_or_default()
    }

    pub fn length(&self, id: ConnectionId) -> f64 {
        geometry::polyline_length(&self.detailed_path(id))
    }

    pub fn total_wire_length(&self) -> f64 {
        self.budget.total(self, None)
    }

    fn port_ends(&self, conn: &Connection) -> Option<(Point, Point)> {
        let from = self.nodes.get(&conn.from)?;
        let to = self.nodes.get(&conn.to)?;
        Some((
            from.port_position(PortSide::Output, conn.from_port, &self.geometry),
            to.port_position(PortSide::Input, conn.to_port, &self.geometry),
        ))
    }

    pub(crate) fn path_of(&self, conn: &Connection) -> Vec<Point> {
        let Some((start, end)) = self.port_ends(conn) else {
            return Vec::new();
        };

        let mut bends: Vec<Point> = conn.bend_points.iter().map(|b| b.position).collect();
        bends.sort_by(|a, b| {
            let pa = geometry::clamped_projection(&start, &end, a);
            let pb = geometry::clamped_projection(&start, &end, b);
            pa.total_cmp(&pb)
                .then(a.x.total_cmp(&b.x))
                .then(a.y.total_cmp(&b.y))
        });

        let mut path = Vec::with_capacity(conn.waypoints.len() + bends.len() + 2);
        path.push(start);
        path.extend(conn.waypoints.iter().copied());
        path.extend(bends);
        path.push(end);
        path
    }

    /// First node (other than `skip`) whose box the path touches.
    fn blocking_node(&self, path: &[Point], skip: &[&NodeId]) -> Option<NodeId> {
        self.nodes
            .values()
            .filter(|n| !skip.contains(&&n.id))
            .find(|n| geometry::polyline_intersects_rect(path, &n.bounds(&self.geometry)))
            .map(|n| n.id.clone())
    }

    // ── Edits ──────────────────────────────────────────────────

    fn commit<T>(
        &mut self,
        edit: impl FnOnce(&mut Network) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        let mut candidate = self.clone();
        let out = edit(&mut candidate)?;
        *self = candidate;
        Ok(out)
    }

    fn ensure_within_budget(&self) -> Result<(), EditError> {
        self.budget.check(self, 0.0, None)
    }

    /// Create a wire from an output port to an input port. With `replace`
    /// set, an existing wire on the same input port is swapped out and its
    /// length excluded from the budget check. Returns the new id and the
    /// replaced wire, if any.
    pub fn connect(
        &mut self,
        from: &NodeId,
        from_port: usize,
        to: &NodeId,
        to_port: usize,
        replace: bool,
    ) -> Result<(ConnectionId, Option<Connection>), EditError> {
        self.commit(|net| {
            let source = net
                .nodes
                .get(from)
                .ok_or_else(|| EditError::UnknownNode { node: from.clone() })?;
            let target = net
                .nodes
                .get(to)
                .ok_or_else(|| EditError::UnknownNode { node: to.clone() })?;
            if from == to {
                return Err(EditError::SelfLoop);
            }
            if to == &net.origin {
                return Err(EditError::IntoOrigin);
            }
            if from == &net.sink {
                return Err(EditError::OutOfSink);
            }
            if from_port >= source.outputs.len() || to_port >= target.inputs.len() {
                return Err(EditError::PortOutOfRange);
            }

            let existing = net.connection_into(to, to_port);
            if existing.is_some() && !replace {
                return Err(EditError::InputPortTaken { node: to.clone(), port: to_port });
            }
            let limit = net.nodes.len() * net.geometry.connections_per_node;
            if existing.is_none() && net.connections.len() >= limit {
                return Err(EditError::ConnectionLimit);
            }

            let conn = Connection {
                id: ConnectionId(net.next_connection),
                from: from.clone(),
                from_port,
                to: to.clone(),
                to_port,
                waypoints: Vec::new(),
                bend_points: Vec::new(),
                bulky_passes: 0,
                destroyed: false,
            };
            let path = net.path_of(&conn);
            if let Some(node) = net.blocking_node(&path, &[from, to]) {
                return Err(EditError::IntersectsNode { node });
            }
            net.budget
                .check(net, geometry::polyline_length(&path), existing)?;

            let replaced = existing.and_then(|id| net.connections.remove(&id));
            let id = conn.id;
            net.next_connection += 1;
            net.connections.insert(id, conn);
            if let Some(node) = net.nodes.get_mut(to) {
                node.connected_inputs.insert(to_port);
            }
            Ok((id, replaced))
        })
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Result<Connection, EditError> {
        self.commit(|net| {
            let conn = net
                .connections
                .remove(&id)
                .ok_or(EditError::UnknownConnection { connection: id })?;
            if let Some(node) = net.nodes.get_mut(&conn.to) {
                node.connected_inputs.remove(&conn.to_port);
            }
            Ok(conn)
        })
    }

    pub fn add_bend_point(&mut self, id: ConnectionId, at: Point) -> Result<(), EditError> {
        self.commit(|net| {
            let radius = net.geometry.bend_point_radius;
            let limit = net.geometry.max_bend_points;
            let conn = net
                .connections
                .get_mut(&id)
                .ok_or(EditError::UnknownConnection { connection: id })?;
            if conn.bend_points.len() >= limit {
                return Err(EditError::BendPointLimit);
            }
            conn.bend_points.push(BendPoint { position: at, radius });
            net.check_path(id)?;
            net.ensure_within_budget()
        })
    }

    pub fn remove_bend_point(&mut self, id: ConnectionId, index: usize) -> Result<(), EditError> {
        self.commit(|net| {
            let conn = net
                .connections
                .get_mut(&id)
                .ok_or(EditError::UnknownConnection { connection: id })?;
            if index >= conn.bend_points.len() {
                return Err(EditError::BendPointOutOfRange);
            }
            conn.bend_points.remove(index);
            Ok(())
        })
    }

    /// Move a bend point. The target is clamped to the point's radius
    /// around where it sits now. Returns the accepted position.
    pub fn move_bend_point(
        &mut self,
        id: ConnectionId,
        index: usize,
        target: Point,
    ) -> Result<Point, EditError> {
        self.commit(|net| {
            let conn = net
                .connections
                .get_mut(&id)
                .ok_or(EditError::UnknownConnection { connection: id })?;
            let bend = conn
                .bend_points
                .get_mut(index)
                .ok_or(EditError::BendPointOutOfRange)?;
            let accepted = geometry::clamp_to_radius(&bend.position, &target, bend.radius);
            bend.position = accepted;
            net.check_path(id)?;
            net.ensure_within_budget()?;
            Ok(accepted)
        })
    }

    pub fn add_waypoint(&mut self, id: ConnectionId, at: Point) -> Result<(), EditError> {
        self.commit(|net| {
            net.connections
                .get_mut(&id)
                .ok_or(EditError::UnknownConnection { connection: id })?
                .waypoints
                .push(at);
            net.ensure_within_budget()
        })
    }

    pub fn move_waypoint(
        &mut self,
        id: ConnectionId,
        index: usize,
        target: Point,
    ) -> Result<(), EditError> {
        self.commit(|net| {
            let conn = net
                .connections
                .get_mut(&id)
                .ok_or(EditError::UnknownConnection { connection: id })?;
            let waypoint = conn
                .waypoints
                .get_mut(index)
                .ok_or(EditError::WaypointOutOfRange)?;
            *waypoint = target;
            net.ensure_within_budget()
        })
    }

    /// Drag a node. The origin and sink stay put. The target is clamped to
    /// the drag radius around the node's current position and the move is
    /// refused if the wires it stretches break the budget.
    pub fn move_node(&mut self, id: &NodeId, target: Point) -> Result<Point, EditError> {
        self.commit(|net| {
            if id == &net.origin || id == &net.sink {
                return Err(EditError::NodeLocked { node: id.clone() });
            }
            let radius = net.geometry.node_drag_radius;
            let node = net
                .nodes
                .get_mut(id)
                .ok_or_else(|| EditError::UnknownNode { node: id.clone() })?;
            let accepted = geometry::clamp_to_radius(&node.position, &target, radius);
            node.position = accepted;
            net.ensure_within_budget()?;
            Ok(accepted)
        })
    }

    fn check_path(&self, id: ConnectionId) -> Result<(), EditError> {
        let Some(conn) = self.connections.get(&id) else {
            return Err(EditError::UnknownConnection { connection: id });
        };
        let path = self.path_of(conn);
        match self.blocking_node(&path, &[&conn.from, &conn.to]) {
            Some(node) => Err(EditError::IntersectsNode { node }),
            None => Ok(()),
        }
    }
}
