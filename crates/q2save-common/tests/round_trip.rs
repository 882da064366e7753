// round_trip.rs — write then read through a small schema

use proptest::prelude::*;
use serde_json::{json, Value};

use q2save_common::q_shared::*;
use q2save_common::save_data::{SaveData, SaveDataRegistry, SaveDataTag};
use q2save_common::save_env::{FixedEntities, NamedItems, SaveEnv};
use q2save_common::save_read::{read_save_struct, ReadCtx};
use q2save_common::save_struct::SaveStruct;
use q2save_common::save_write::{write_save_struct, WriteCtx};
use q2save_common::tag_arena::{LevelString, LevelTag, TagArena, TagVec};
use q2save_common::{field, impl_save_enum, save_struct, save_tag};

type PainFn = fn(i32) -> i32;

save_tag!(PainTag: fn PainFn = SaveDataTag(3), "pain");

fn flinch(damage: i32) -> i32 {
    damage / 2
}

fn shrug(damage: i32) -> i32 {
    damage / 4
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
enum Stance {
    #[default]
    Stand = 0,
    Crouch = 1,
    Prone = 2,
}

impl_save_enum!(Stance, u8, [Stand, Crouch, Prone]);

#[derive(Debug, Clone, Default, PartialEq)]
struct Waypoint {
    origin: Vec3,
    wait: f32,
}

save_struct!(Waypoint {
    field!("origin", Waypoint, origin),
    field!("wait", Waypoint, wait),
});

#[derive(Debug, Clone, Default, PartialEq)]
struct Actor {
    health: i32,
    frags: i64,
    flags: u32,
    yaw: f32,
    stance: Stance,
    netname: FixedString<16>,
    message: LevelString,
    enemy: EntityRef,
    weapon: Option<ItemId>,
    timestamp: GameTime,
    pain: SaveData<PainTag>,
    inventory: Inventory,
    seen: BitSet<8>,
    route: TagVec<Waypoint, LevelTag>,
    home: Waypoint,
}

save_struct!(Actor {
    field!("health", Actor, health),
    field!("frags", Actor, frags),
    field!("flags", Actor, flags),
    field!("yaw", Actor, yaw),
    field!("stance", Actor, stance),
    field!("netname", Actor, netname),
    field!("message", Actor, message),
    field!("enemy", Actor, enemy),
    field!("weapon", Actor, weapon),
    field!("timestamp", Actor, timestamp),
    field!("pain", Actor, pain),
    field!("inventory", Actor, inventory),
    field!("seen", Actor, seen),
    field!("route", Actor, route),
    field!("home", Actor, home),
});

struct World {
    items: NamedItems,
    entities: FixedEntities,
    pointers: SaveDataRegistry,
}

impl World {
    fn new() -> Self {
        let mut pointers = SaveDataRegistry::new();
        pointers
            .register_list::<PainTag>(&[("flinch", flinch as PainFn), ("shrug", shrug as PainFn)])
            .unwrap();
        pointers.finalize(true).unwrap();
        World {
            items: NamedItems { classnames: vec!["weapon_blaster", "weapon_shotgun", "ammo_shells"] },
            entities: FixedEntities { max_entities: 64 },
            pointers,
        }
    }

    fn env(&self, strict: bool) -> SaveEnv<'_> {
        SaveEnv::new(&self.items, &self.entities, &self.pointers, strict)
    }

    fn write(&self, actor: &Actor) -> Value {
        let mut ctx = WriteCtx::new(self.env(true));
        write_save_struct(actor, Actor::save_struct(), false, &mut ctx)
            .unwrap()
            .unwrap()
    }

    fn read(&self, json: &Value) -> Actor {
        let mut arena = TagArena::new();
        let mut ctx = ReadCtx::new(self.env(true), &mut arena);
        let mut actor = Actor::default();
        read_save_struct(json, &mut actor, Actor::save_struct(), &mut ctx).unwrap();
        actor
    }
}

fn sample_actor() -> Actor {
    let mut actor = Actor {
        health: 85,
        frags: -3,
        flags: 0x8000_0001,
        yaw: 270.25,
        stance: Stance::Crouch,
        netname: FixedString::from_text("Grunt").unwrap(),
        message: LevelString::from("press the button"),
        enemy: Some(EntityId::new(12, 0)),
        weapon: Some(ItemId(2)),
        timestamp: GameTime::from_ms(15_300),
        pain: SaveData::<PainTag>::new(flinch),
        ..Default::default()
    };
    actor.inventory.set(ItemId(3), 25);
    actor.seen.set(5, true);
    actor.route.push(Waypoint { origin: [64.0, -128.0, 24.0], wait: 1.5 });
    actor.route.push(Waypoint::default());
    actor
}

// ============================================================
// Fixed samples
// ============================================================

#[test]
fn test_round_trip_preserves_every_field() {
    let world = World::new();
    let actor = sample_actor();
    let json = world.write(&actor);
    assert_eq!(world.read(&json), actor);
}

#[test]
fn test_second_write_is_identical() {
    let world = World::new();
    let first = world.write(&sample_actor());
    let second = world.write(&world.read(&first));
    assert_eq!(first, second);
}

#[test]
fn test_default_actor_writes_empty_object() {
    let world = World::new();
    assert_eq!(world.write(&Actor::default()), json!({}));
}

#[test]
fn test_sparse_document_layout() {
    let world = World::new();
    let json = world.write(&sample_actor());
    assert_eq!(json["pain"], json!("flinch"));
    assert_eq!(json["weapon"], json!("weapon_shotgun"));
    assert_eq!(json["inventory"], json!({"ammo_shells": 25}));
    assert_eq!(json["seen"], json!("000001"));
    assert_eq!(json["route"][1], json!({}));
    assert!(json.get("home").is_none());
}

#[test]
fn test_unknown_fields_ignored() {
    let world = World::new();
    let mut json = world.write(&sample_actor());
    json["spawn_angle"] = json!(90);
    assert_eq!(world.read(&json), sample_actor());
}

#[test]
fn test_null_struct_reads_as_defaults() {
    let world = World::new();
    let actor = world.read(&json!({"health": 5, "home": null, "route": [null, {"wait": 2.0}]}));
    assert_eq!(actor.health, 5);
    assert_eq!(actor.home, Waypoint::default());
    assert_eq!(actor.route.as_slice(), &[Waypoint::default(), Waypoint { origin: [0.0; 3], wait: 2.0 }]);
}

// ============================================================
// Float extremes
// ============================================================

fn waypoint_of(v: f32) -> Waypoint {
    Waypoint { origin: [v, -v, v], wait: v }
}

fn float_round_trip(world: &World, v: f32) -> Waypoint {
    let mut wctx = WriteCtx::new(world.env(true));
    let json = write_save_struct(&waypoint_of(v), Waypoint::save_struct(), false, &mut wctx)
        .unwrap()
        .unwrap();

    let mut arena = TagArena::new();
    let mut rctx = ReadCtx::new(world.env(true), &mut arena);
    let mut out = Waypoint::default();
    read_save_struct(&json, &mut out, Waypoint::save_struct(), &mut rctx).unwrap();
    assert!(rctx.warnings().is_empty());
    out
}

fn same_float(a: f32, b: f32) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

fn same_waypoint(a: &Waypoint, b: &Waypoint) -> bool {
    a.origin.iter().zip(b.origin.iter()).all(|(x, y)| same_float(*x, *y)) && same_float(a.wait, b.wait)
}

#[test]
fn test_float_limits_round_trip() {
    let world = World::new();
    for v in [
        f32::MAX,
        -f32::MAX,
        f32::MIN_POSITIVE,
        f32::from_bits(1),
        f32::INFINITY,
        f32::NEG_INFINITY,
        f32::NAN,
    ] {
        let out = float_round_trip(&world, v);
        assert!(same_waypoint(&out, &waypoint_of(v)), "{v} came back as {out:?}");
    }
}

// ============================================================
// Generated values
// ============================================================

fn text() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(1u8..=255, 0..15)
}

prop_compose! {
    fn waypoint()(origin in prop::array::uniform3(-4096.0f32..4096.0), wait in 0.0f32..30.0) -> Waypoint {
        Waypoint { origin, wait }
    }
}

prop_compose! {
    fn actor()(
        (health, frags, flags, yaw) in (any::<i32>(), any::<i64>(), any::<u32>(), -720.0f32..720.0),
        stance in prop_oneof![Just(Stance::Stand), Just(Stance::Crouch), Just(Stance::Prone)],
        (netname, message) in (text(), prop::option::of(text())),
        (enemy, weapon) in (prop::option::of(0u32..64), prop::option::of(1u16..=3)),
        (timestamp, pain) in (any::<i64>(), 0u8..3),
        counts in prop::collection::vec((1u16..=3, any::<i32>()), 0..4),
        seen in prop::collection::vec(any::<bool>(), 8),
        (route, home) in (prop::collection::vec(waypoint(), 0..4), waypoint()),
    ) -> Actor {
        let mut actor = Actor {
            health,
            frags,
            flags,
            yaw,
            stance,
            enemy: enemy.map(|i| EntityId::new(i, 0)),
            weapon: weapon.map(ItemId),
            timestamp: GameTime::from_ms(timestamp),
            home,
            ..Default::default()
        };
        actor.netname.set_bytes(&netname);
        actor.message.set(message.as_deref());
        actor.pain.set(match pain {
            0 => None,
            1 => Some(flinch as PainFn),
            _ => Some(shrug as PainFn),
        });
        for (item, count) in counts {
            actor.inventory.set(ItemId(item), count);
        }
        for (i, bit) in seen.into_iter().enumerate() {
            actor.seen.set(i, bit);
        }
        for w in route {
            actor.route.push(w);
        }
        actor
    }
}

proptest! {
    #[test]
    fn prop_round_trip(actor in actor()) {
        let world = World::new();
        let json = world.write(&actor);
        prop_assert_eq!(world.read(&json), actor);
    }

    #[test]
    fn prop_any_float_round_trips(v in proptest::num::f32::ANY) {
        let world = World::new();
        let out = float_round_trip(&world, v);
        prop_assert!(same_waypoint(&out, &waypoint_of(v)), "{} came back as {:?}", v, out);
    }

    #[test]
    fn prop_rewrite_is_stable(actor in actor()) {
        let world = World::new();
        let first = world.write(&actor);
        let text = serde_json::to_string(&first).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(world.write(&world.read(&reparsed)), first);
    }
}
