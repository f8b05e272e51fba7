use crate::{
    network::Behavior,
    packet::PacketKind,
    types::NodeId,
};
use serde::{Deserialize, Serialize};

/// Canvas geometry shared by path computation and edit validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub node_size: f64,
    /// Gap between a node's box and its port markers.
    pub port_offset: f64,
    pub max_bend_points: usize,
    pub bend_point_radius: f64,
    pub node_drag_radius: f64,
    /// Connections allowed per node in the level.
    pub connections_per_node: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockwaveConfig {
    pub lifespan_ms: i64,
    pub max_radius: f64,
    pub force: f64,
    pub max_displacement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    pub noise_immunity_ms: i64,
    pub collision_immunity_ms: i64,
    pub speed_booster_ms: i64,
    pub speed_booster_factor: f64,
    pub speed_limiter_ms: i64,
    pub speed_limiter_factor: f64,
    pub wire_optimizer_ms: i64,
    pub wire_optimizer_factor: f64,
    pub freeze_ms: i64,
    pub restore_ms: i64,
    /// Displacement removed per tick on a restored connection.
    pub restoration_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub tick_ms: i64,
    /// Fraction of a segment covered per tick at nominal speed.
    pub base_speed: f64,
    pub max_safe_speed: f64,
    pub long_wire_threshold: f64,
    pub wire_acceleration_factor: f64,
    pub incompatible_port_factor: f64,
    pub confidential_slowdown: f64,
    pub confidential_keep_distance: f64,
    pub loss_distance: f64,
    pub circle_collision_distance: f64,
    pub noise_loss_threshold: f64,
    pub packet_timeout_ms: i64,
    pub large_packet_threshold: u32,
    pub bulky_wire_limit: u32,
    pub trojan_probability: f64,
    pub antitrojan_radius: f64,
    pub antitrojan_cooldown_ms: i64,
    pub system_damage_ms: i64,
    pub geometry: GeometryConfig,
    pub shockwave: ShockwaveConfig,
    pub effects: EffectConfig,
}

/// Coin prices of everything the shop sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopConfig {
    pub noise_immunity: u64,
    pub collision_immunity: u64,
    pub noise_purge: u64,
    pub speed_booster: u64,
    pub speed_limiter: u64,
    pub wire_optimizer: u64,
    pub freeze_scroll: u64,
    pub restore_scroll: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub inputs: Vec<PacketKind>,
    pub outputs: Vec<PacketKind>,
    #[serde(default)]
    pub behavior: Behavior,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    pub number: u32,
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    pub origin: NodeId,
    pub sink: NodeId,
    pub wire_ceiling: f64,
    pub packet_quota: u32,
    pub max_packet_loss: u32,
    #[serde(default)]
    pub starting_coins: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct LevelCatalogFile {
    levels: Vec<LevelDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub physics: PhysicsConfig,
    pub shop: ShopConfig,
    pub levels: Vec<LevelDescriptor>,
}

impl SimConfig {
    /// Load every config file from `data_dir`.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let physics_path = format!("{data_dir}/physics.json");
        let physics_content = std::fs::read_to_string(&physics_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {physics_path}: {e}"))?;
        let physics: PhysicsConfig = serde_json::from_str(&physics_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {physics_path}: {e}"))?;

        let shop_path = format!("{data_dir}/shop.json");
        let shop_content = std::fs::read_to_string(&shop_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {shop_path}: {e}"))?;
        let shop: ShopConfig = serde_json::from_str(&shop_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {shop_path}: {e}"))?;

        let levels_path = format!("{data_dir}/levels.json");
        let levels_content = std::fs::read_to_string(&levels_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {levels_path}: {e}"))?;
        let catalog: LevelCatalogFile = serde_json::from_str(&levels_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {levels_path}: {e}"))?;

        if catalog.levels.is_empty() {
            anyhow::bail!("{levels_path} defines no levels");
        }

        Ok(Self { physics, shop, levels: catalog.levels })
    }

    pub fn level(&self, number: u32) -> Option<&LevelDescriptor> {
        self.levels.iter().find(|l| l.number == number)
    }

    /// Hardcoded config for tests. Numbers match the shipped data files;
    /// the only level is the first one.
    pub fn default_test() -> Self {
        Self {
            physics: PhysicsConfig::default_test(),
            shop: ShopConfig {
                noise_immunity: 3,
                collision_immunity: 4,
                noise_purge: 5,
                speed_booster: 6,
                speed_limiter: 8,
                wire_optimizer: 10,
                freeze_scroll: 10,
                restore_scroll: 20,
            },
            levels: vec![LevelDescriptor::default_test()],
        }
    }
}

impl PhysicsConfig {
    pub fn default_test() -> Self {
        Self {
            tick_ms: 16,
            base_speed: 0.02,
            max_safe_speed: 0.1,
            long_wire_threshold: 300.0,
            wire_acceleration_factor: 2.0,
            incompatible_port_factor: 2.0,
            confidential_slowdown: 0.3,
            confidential_keep_distance: 50.0,
            loss_distance: 10.0,
            circle_collision_distance: 2.0,
            noise_loss_threshold: 1.0 / 11.0,
            packet_timeout_ms: 10_000,
            large_packet_threshold: 5,
            bulky_wire_limit: 3,
            trojan_probability: 0.3,
            antitrojan_radius: 100.0,
            antitrojan_cooldown_ms: 3_000,
            system_damage_ms: 5_000,
            geometry: GeometryConfig {
                node_size: 50.0,
                port_offset: 10.0,
                max_bend_points: 3,
                bend_point_radius: 50.0,
                node_drag_radius: 100.0,
                connections_per_node: 3,
            },
            shockwave: ShockwaveConfig {
                lifespan_ms: 500,
                max_radius: 100.0,
                force: 5.0,
                max_displacement: 5.0,
            },
            effects: EffectConfig {
                noise_immunity_ms: 10_000,
                collision_immunity_ms: 5_000,
                speed_booster_ms: 8_000,
                speed_booster_factor: 1.5,
                speed_limiter_ms: 10_000,
                speed_limiter_factor: 0.7,
                wire_optimizer_ms: 12_000,
                wire_optimizer_factor: 0.8,
                freeze_ms: 20_000,
                restore_ms: 30_000,
                restoration_speed: 0.05,
            },
        }
    }
}

impl LevelDescriptor {
    /// Level 1: four plain nodes, origin A, sink C.
    pub fn default_test() -> Self {
        let shapes = vec![PacketKind::Square, PacketKind::Triangle];
        let node = |id: &str, x: f64, y: f64| NodeSpec {
            id: NodeId::from(id),
            x,
            y,
            inputs: shapes.clone(),
            outputs: shapes.clone(),
            behavior: Behavior::Plain,
        };
        Self {
            number: 1,
            name: "Network Foundation".into(),
            nodes: vec![
                node("A", 100.0, 100.0),
                node("B", 500.0, 100.0),
                node("C", 100.0, 500.0),
                node("D", 500.0, 500.0),
            ],
            origin: NodeId::from("A"),
            sink: NodeId::from("C"),
            wire_ceiling: 2000.0,
            packet_quota: 20,
            max_packet_loss: 10,
            starting_coins: 0,
        }
    }
}
