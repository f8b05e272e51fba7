//! Node Behavior Dispatcher.
//!
//! Execution: whenever a packet reaches the end of a wire at a node other
//! than the sink. Runs inside the motion phase.
//!
//! Order per arrival: coin award, node behaviour, bulky side effects,
//! incompatible-entry penalty, circle collision check.

use crate::{
    event::{Conversion, DropReason, ReturnReason, SimEvent, SpawnOrigin},
    network::Behavior,
    packet::{Lineage, PacketKind},
    rng::SubsystemRng,
    subsystem::TickContext,
    types::{ConnectionId, NodeId, PacketId},
};

/// What became of a packet after its node handled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Still at the node; pick the next wire.
    Continue,
    /// Already placed on a wire elsewhere.
    Relocated,
    /// Gone: destroyed, split or absorbed.
    Consumed,
    /// Turned around; travels backward from here.
    Returning,
}

pub fn dispatch(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    rng: &mut SubsystemRng,
    events: &mut Vec<SimEvent>,
) -> Arrival {
    let Some(packet) = ctx.world.packet(id) else {
        return Arrival::Consumed;
    };
    let arrival = packet.connection;
    let coins = packet.coin_value();
    let bulky = packet.is_bulky();
    let Some(node_id) = ctx.world.network.connection(arrival).map(|c| c.to.clone()) else {
        return Arrival::Consumed;
    };
    let Some(behavior) = ctx.world.network.node(&node_id).map(|n| n.behavior) else {
        return Arrival::Consumed;
    };
    let penalty = match ctx.world.network.port_shapes(arrival) {
        Some((Some(out), Some(inp))) if out != inp => ctx.physics.incompatible_port_factor,
        _ => 1.0,
    };

    ctx.world.purse.credit(coins);
    events.push(SimEvent::PacketArrived { packet: id, node: node_id.clone(), coins });

    let outcome = match behavior {
        Behavior::Spy => spy(ctx, id, &node_id, rng, events),
        Behavior::Sabotage => sabotage(ctx, id, &node_id, rng, events),
        Behavior::Vpn => vpn(ctx, id, &node_id, events),
        Behavior::Distribute => distribute(ctx, id, &node_id, events),
        Behavior::Merge => merge(ctx, id, &node_id, events),
        Behavior::Plain
        | Behavior::AntiTrojan
        | Behavior::Malicious
        | Behavior::Controllable
        | Behavior::Uncontrollable => Arrival::Continue,
    };

    if bulky {
        wear_wire(ctx, arrival, events);
        if outcome != Arrival::Consumed {
            clear_node_wires(ctx, id, &node_id, events);
            shuffle_ports(ctx, &node_id, rng, events);
        }
    }

    if outcome == Arrival::Consumed {
        return outcome;
    }
    if let Some(packet) = ctx.world.packet_mut(id) {
        packet.entry_penalty = penalty;
    }
    if outcome == Arrival::Continue && circle_blocked(ctx, id) {
        if let Some(packet) = ctx.world.packet_mut(id) {
            packet.returning = true;
        }
        events.push(SimEvent::PacketReturning { packet: id, reason: ReturnReason::CircleCollision });
        return Arrival::Returning;
    }
    outcome
}

/// Destroys confidential traffic and bounces everything else except
/// protected packets to another spy node.
fn spy(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    node_id: &NodeId,
    rng: &mut SubsystemRng,
    events: &mut Vec<SimEvent>,
) -> Arrival {
    let Some(packet) = ctx.world.packet(id) else {
        return Arrival::Consumed;
    };
    if packet.is_confidential() {
        ctx.world.remove_packet(id);
        events.push(SimEvent::PacketDropped { packet: id, reason: DropReason::Spy });
        log::debug!("tick={} packet={id} destroyed by spy {node_id}", ctx.tick);
        return Arrival::Consumed;
    }
    if packet.is_protected() || packet.is_bit() {
        return Arrival::Continue;
    }

    let damage_ms = ctx.physics.system_damage_ms;
    let exits: Vec<(NodeId, ConnectionId)> = ctx
        .world
        .network
        .nodes()
        .filter(|n| n.behavior == Behavior::Spy && &n.id != node_id)
        .filter(|n| !n.is_damaged(ctx.now, damage_ms))
        .filter_map(|n| ctx.world.first_free_outgoing(&n.id).map(|c| (n.id.clone(), c)))
        .collect();
    if exits.is_empty() {
        return Arrival::Continue;
    }

    let (exit_node, exit_wire) = exits[rng.pick_index(exits.len())].clone();
    if !ctx.world.transfer(id, exit_wire) {
        return Arrival::Continue;
    }
    events.push(SimEvent::PacketTeleported { packet: id, from: node_id.clone(), to: exit_node });
    Arrival::Relocated
}

fn sabotage(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    node_id: &NodeId,
    rng: &mut SubsystemRng,
    events: &mut Vec<SimEvent>,
) -> Arrival {
    let trojan_probability = ctx.physics.trojan_probability;
    let Some(packet) = ctx.world.packet_mut(id) else {
        return Arrival::Consumed;
    };
    if packet.is_protected() {
        return Arrival::Continue;
    }
    if packet.noise == 0.0 {
        packet.noise = 1.0;
    }
    if rng.chance(trojan_probability) {
        packet.infect();
        events.push(SimEvent::PacketConverted {
            packet: id,
            node: Some(node_id.clone()),
            kind: packet.kind,
            conversion: Conversion::Trojan,
        });
    }
    Arrival::Continue
}

/// Protects what passes through and answers confidential_4 traffic with
/// a confidential_6 packet.
fn vpn(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    node_id: &NodeId,
    events: &mut Vec<SimEvent>,
) -> Arrival {
    let Some(packet) = ctx.world.packet_mut(id) else {
        return Arrival::Consumed;
    };
    let owner = packet.owner;
    let answer = packet.kind == PacketKind::Confidential4;
    if !packet.is_protected() && !packet.is_bit() {
        packet.protect(node_id);
        events.push(SimEvent::PacketConverted {
            packet: id,
            node: Some(node_id.clone()),
            kind: packet.kind,
            conversion: Conversion::Protected,
        });
    }

    if answer {
        let spawned = ctx.world.first_free_outgoing(node_id).and_then(|wire| {
            ctx.world
                .spawn(wire, PacketKind::Confidential6, owner, ctx.now, ctx.physics.base_speed)
                .map(|p| (p, wire))
        });
        if let Some((packet, connection)) = spawned {
            events.push(SimEvent::PacketSpawned {
                packet,
                kind: PacketKind::Confidential6,
                connection,
                origin: SpawnOrigin::Vpn,
            });
        }
    }
    Arrival::Continue
}

/// Splits large and bulky packets into one bit fragment per unit of size,
/// each on its own free outgoing wire.
fn distribute(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    node_id: &NodeId,
    events: &mut Vec<SimEvent>,
) -> Arrival {
    let Some(packet) = ctx.world.packet(id) else {
        return Arrival::Consumed;
    };
    let splittable = packet.is_bulky() || packet.size() >= ctx.physics.large_packet_threshold;
    if !splittable || ctx.world.first_free_outgoing(node_id).is_none() {
        return Arrival::Continue;
    }
    let Some(parent) = ctx.world.remove_packet(id) else {
        return Arrival::Consumed;
    };
    let size = parent.size();

    let mut spawned = Vec::new();
    for _ in 0..size {
        let Some(wire) = ctx.world.first_free_outgoing(node_id) else {
            break;
        };
        let Some(bit) = ctx.world.spawn(wire, PacketKind::Bit, parent.owner, ctx.now, ctx.physics.base_speed) else {
            break;
        };
        spawned.push((bit, wire));
    }

    let lineage = Lineage {
        parent: id,
        kind: parent.kind,
        original_kind: parent.original_kind,
        size,
        fragments: spawned.len() as u32,
    };
    for (bit, wire) in spawned {
        if let Some(fragment) = ctx.world.packet_mut(bit) {
            fragment.lineage = Some(lineage);
        }
        events.push(SimEvent::PacketSpawned {
            packet: bit,
            kind: PacketKind::Bit,
            connection: wire,
            origin: SpawnOrigin::Fragment,
        });
    }
    if lineage.is_complete() {
        log::debug!("tick={} packet={id} split into {size} bits at {node_id}", ctx.tick);
    } else {
        log::warn!(
            "tick={} packet={id} split into only {}/{size} bits at {node_id}",
            ctx.tick, lineage.fragments
        );
    }
    Arrival::Consumed
}

/// Holds bit fragments until all siblings of a parent have arrived, then
/// turns the last one into the reassembled packet. Fragments of a short
/// split can never complete and are dropped on arrival.
fn merge(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    node_id: &NodeId,
    events: &mut Vec<SimEvent>,
) -> Arrival {
    let Some(lineage) = ctx.world.packet(id).filter(|p| p.is_bit()).and_then(|p| p.lineage) else {
        return Arrival::Continue;
    };
    if !lineage.is_complete() {
        ctx.world.remove_packet(id);
        events.push(SimEvent::PacketDropped { packet: id, reason: DropReason::IncompleteSplit });
        log::debug!(
            "tick={} packet={id} dropped at {node_id}: parent {} split into {}/{} bits",
            ctx.tick, lineage.parent, lineage.fragments, lineage.size
        );
        return Arrival::Consumed;
    }
    let Some(node) = ctx.world.network.node_mut(node_id) else {
        return Arrival::Continue;
    };
    let held = node.merge_buffer.get(&lineage.parent).copied().unwrap_or(0);

    if held + 1 >= lineage.size {
        node.merge_buffer.remove(&lineage.parent);
        let connection = match ctx.world.packet_mut(id) {
            Some(packet) => {
                packet.kind = lineage.kind;
                packet.original_kind = lineage.original_kind;
                packet.lineage = None;
                packet.connection
            }
            None => return Arrival::Consumed,
        };
        events.push(SimEvent::PacketSpawned {
            packet: id,
            kind: lineage.kind,
            connection,
            origin: SpawnOrigin::Merged,
        });
        return Arrival::Continue;
    }

    node.merge_buffer.insert(lineage.parent, held + 1);
    ctx.world.remove_packet(id);
    events.push(SimEvent::FragmentBuffered {
        packet: id,
        node: node_id.clone(),
        parent: lineage.parent,
        held: held + 1,
    });
    Arrival::Consumed
}

fn wear_wire(ctx: &mut TickContext<'_>, wire: ConnectionId, events: &mut Vec<SimEvent>) {
    let limit = ctx.physics.bulky_wire_limit;
    let Some(conn) = ctx.world.network.connection_mut(wire) else {
        return;
    };
    conn.bulky_passes += 1;
    if conn.bulky_passes >= limit && !conn.destroyed {
        conn.destroyed = true;
        events.push(SimEvent::WireDestroyed { connection: wire });
        log::debug!("tick={} wire={wire} destroyed after {} bulky passes", ctx.tick, conn.bulky_passes);
    }
}

/// Bulky traffic knocks every other packet off the node's wires.
fn clear_node_wires(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    node_id: &NodeId,
    events: &mut Vec<SimEvent>,
) {
    let riders: Vec<PacketId> = ctx
        .world
        .network
        .connections()
        .filter(|c| c.touches(node_id))
        .filter_map(|c| ctx.world.occupant(c.id))
        .filter(|p| *p != id)
        .collect();
    for rider in riders {
        ctx.world.remove_packet(rider);
        events.push(SimEvent::PacketDropped { packet: rider, reason: DropReason::ClearedByBulky });
    }
}

/// Reshape one input and one output port, when the node has more than one.
fn shuffle_ports(
    ctx: &mut TickContext<'_>,
    node_id: &NodeId,
    rng: &mut SubsystemRng,
    events: &mut Vec<SimEvent>,
) {
    let Some(node) = ctx.world.network.node_mut(node_id) else {
        return;
    };
    let shapes = PacketKind::PORT_SHAPES;
    let input = (node.inputs.len() > 1).then(|| {
        let port = rng.pick_index(node.inputs.len());
        let shape = shapes[rng.pick_index(shapes.len())];
        node.inputs[port] = shape;
        (port, shape)
    });
    let output = (node.outputs.len() > 1).then(|| {
        let port = rng.pick_index(node.outputs.len());
        let shape = shapes[rng.pick_index(shapes.len())];
        node.outputs[port] = shape;
        (port, shape)
    });
    if input.is_some() || output.is_some() {
        events.push(SimEvent::PortsRandomized { node: node_id.clone(), input, output });
    }
}

/// Circle packets turn back when another packet sits on top of them.
fn circle_blocked(ctx: &TickContext<'_>, id: PacketId) -> bool {
    let Some(packet) = ctx.world.packet(id) else {
        return false;
    };
    if packet.kind != PacketKind::Circle {
        return false;
    }
    let here = ctx.world.position(packet);
    let reach = ctx.physics.circle_collision_distance;
    ctx.world
        .packets()
        .filter(|other| other.id != id)
        .any(|other| ctx.world.position(other).distance(&here) <= reach)
}
