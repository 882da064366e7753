// g_local.rs — Local definitions for game module

use std::collections::HashMap;

pub use q2save_common::q_shared::*;
pub use q2save_common::tag_arena::{GameString, LevelString, LevelTag, TagArena, TagVec, TAG_GAME, TAG_LEVEL};
use q2save_common::save_data::SaveData;
use q2save_common::save_env::EntityResolver;
use q2save_common::{impl_save_bitflags, impl_save_enum};

use crate::dispatch::{
    BlockedTag, CheckAttackTag, DieTag, MMoveTag, MonsterThinkTag, MoveEndTag, PainTag, ThinkTag, TouchTag, UseTag,
};
use crate::g_items::ItemList;
use crate::game_import::GameImport;

pub const MAX_TOKEN_CHARS: usize = 512;
pub const MAX_INFO_STRING: usize = 512;

pub const FRAMETIME: GameTime = GameTime::from_ms(100);

pub const AMMO_MAX: usize = 6;
pub const FLOOD_HISTORY: usize = 10;
pub const MAX_HEALTH_BARS: usize = 2;

// edict->flags
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EntityFlags: i32 {
        const FLY            = 0x00000001;
        const SWIM           = 0x00000002;
        const IMMUNE_LASER   = 0x00000004;
        const INWATER        = 0x00000008;
        const GODMODE        = 0x00000010;
        const NOTARGET       = 0x00000020;
        const IMMUNE_SLIME   = 0x00000040;
        const IMMUNE_LAVA    = 0x00000080;
        const PARTIALGROUND  = 0x00000100;
        const WATERJUMP      = 0x00000200;
        const TEAMSLAVE      = 0x00000400;
        const NO_KNOCKBACK   = 0x00000800;
        const POWER_ARMOR    = 0x00001000;
        const RESPAWN        = -2147483648_i32; // 0x80000000
    }
}

impl_save_bitflags!(EntityFlags, i32);

/// Flags carried across a level change in `pers.saved_flags`.
pub const FL_SAVED_MASK: EntityFlags =
    EntityFlags::GODMODE.union(EntityFlags::NOTARGET).union(EntityFlags::POWER_ARMOR);

// Monster AI flags
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AiFlags: i32 {
        const STAND_GROUND      = 0x00000001;
        const TEMP_STAND_GROUND = 0x00000002;
        const SOUND_TARGET      = 0x00000004;
        const LOST_SIGHT        = 0x00000008;
        const PURSUIT_LAST_SEEN = 0x00000010;
        const PURSUE_NEXT       = 0x00000020;
        const PURSUE_TEMP       = 0x00000040;
        const HOLD_FRAME        = 0x00000080;
        const GOOD_GUY          = 0x00000100;
        const BRUTAL            = 0x00000200;
        const NOSTEP            = 0x00000400;
        const DUCKED            = 0x00000800;
        const COMBAT_POINT      = 0x00001000;
        const MEDIC             = 0x00002000;
        const RESURRECTING      = 0x00004000;
    }
}

impl_save_bitflags!(AiFlags, i32);

// pmove->pm_flags
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PmFlags: u16 {
        const DUCKED         = 1;
        const JUMP_HELD      = 2;
        const ON_GROUND      = 4;
        const TIME_WATERJUMP = 8;
        const TIME_LAND      = 16;
        const TIME_TELEPORT  = 32;
        const NO_PREDICTION  = 64;
    }
}

impl_save_bitflags!(PmFlags, u16);

// edict->svflags
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SvFlags: u32 {
        const NOCLIENT    = 0x00000001;
        const DEADMONSTER = 0x00000002;
        const MONSTER     = 0x00000004;
    }
}

impl_save_bitflags!(SvFlags, u32);

// Item flags
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ItemFlags: i32 {
        const WEAPON    = 1;
        const AMMO      = 2;
        const ARMOR     = 4;
        const STAY_COOP = 8;
        const KEY       = 16;
        const POWERUP   = 32;
    }
}

// ============================================================
// Enums
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum Damage {
    #[default]
    No = 0,
    Yes,
    Aim,
}

impl_save_enum!(Damage, i32, [No, Yes, Aim]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum WeaponState {
    #[default]
    Ready = 0,
    Activating,
    Dropping,
    Firing,
}

impl_save_enum!(WeaponState, i32, [Ready, Activating, Dropping, Firing]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum MoveType {
    #[default]
    None = 0,
    Noclip,
    Push,
    Stop,
    Walk,
    Step,
    Fly,
    Toss,
    FlyMissile,
    Bounce,
}

impl_save_enum!(MoveType, i32, [None, Noclip, Push, Stop, Walk, Step, Fly, Toss, FlyMissile, Bounce]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Solid {
    #[default]
    Not = 0,
    Trigger,
    Bbox,
    Bsp,
}

impl_save_enum!(Solid, u8, [Not, Trigger, Bbox, Bsp]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PmType {
    #[default]
    Normal = 0,
    Spectator,
    Dead,
    Gib,
    Freeze,
}

impl_save_enum!(PmType, u8, [Normal, Spectator, Dead, Gib, Freeze]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum DeadFlag {
    #[default]
    No = 0,
    Dying,
    Dead,
    Respawnable,
}

impl_save_enum!(DeadFlag, i32, [No, Dying, Dead, Respawnable]);

/// Mover state for plats, doors and trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum MoveState {
    #[default]
    Top = 0,
    Bottom,
    Up,
    Down,
}

impl_save_enum!(MoveState, i32, [Top, Bottom, Up, Down]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum AttackState {
    #[default]
    None = 0,
    Straight,
    Sliding,
    Melee,
    Missile,
}

impl_save_enum!(AttackState, i32, [None, Straight, Sliding, Melee, Missile]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum WaterLevel {
    #[default]
    None = 0,
    Feet,
    Waist,
    Under,
}

impl_save_enum!(WaterLevel, u8, [None, Feet, Waist, Under]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ShadowLightType {
    #[default]
    Point = 0,
    Cone,
}

impl_save_enum!(ShadowLightType, u8, [Point, Cone]);

// ============================================================
// Monster frame/move types
// ============================================================

pub type AiFn = fn(self_idx: usize, ctx: &mut GameCtx, dist: f32);

/// A single animation frame for a monster.
#[derive(Clone, Copy)]
pub struct MFrame {
    pub ai_fn: Option<AiFn>,
    pub dist: f32,
    pub think_fn: Option<fn(self_idx: usize, ctx: &mut GameCtx)>,
}

/// A monster move sequence (a set of animation frames).
pub struct MMove {
    pub firstframe: i32,
    pub lastframe: i32,
    pub frames: &'static [MFrame],
    pub endfunc: Option<fn(self_idx: usize, ctx: &mut GameCtx)>,
}

impl MMove {
    pub fn frame(&self, frame: i32) -> Option<&MFrame> {
        let offset = frame.checked_sub(self.firstframe)?;
        self.frames.get(usize::try_from(offset).ok()?)
    }
}

// ============================================================
// Structures
// ============================================================

/// Per-map statistics kept for the end-of-unit summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelEntry {
    pub map_name: FixedString<MAX_QPATH>,
    pub pretty_name: FixedString<MAX_QPATH>,
    pub total_secrets: i32,
    pub found_secrets: i32,
    pub total_monsters: i32,
    pub killed_monsters: i32,
    pub time: GameTime,
    pub visit_order: u32,
}

/// Persistent game state (survives level changes).
#[derive(Debug, Clone, PartialEq)]
pub struct GameLocals {
    pub helpmessage1: FixedString<MAX_TOKEN_CHARS>,
    pub helpmessage2: FixedString<MAX_TOKEN_CHARS>,
    pub help1changed: i32,
    pub help2changed: i32,
    pub spawnpoint: FixedString<MAX_TOKEN_CHARS>,
    pub maxclients: u32,
    pub maxentities: u32,
    pub cross_level_flags: u32,
    pub cross_unit_flags: u32,
    pub autosaved: bool,
    pub level_entries: [LevelEntry; MAX_LEVEL_ENTRIES],
}

impl Default for GameLocals {
    fn default() -> Self {
        Self {
            helpmessage1: FixedString::new(),
            helpmessage2: FixedString::new(),
            help1changed: 0,
            help2changed: 0,
            spawnpoint: FixedString::new(),
            maxclients: 0,
            maxentities: 0,
            cross_level_flags: 0,
            cross_unit_flags: 0,
            autosaved: false,
            level_entries: std::array::from_fn(|_| LevelEntry::default()),
        }
    }
}

/// Dynamic shadow light attached to an entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowLightInfo {
    pub entity_number: i32,
    pub lighttype: ShadowLightType,
    pub radius: f32,
    pub resolution: i32,
    pub intensity: f32,
    pub fade_start: f32,
    pub fade_end: f32,
    pub lightstyle: i32,
    pub coneangle: f32,
    pub conedirection: Vec3,
}

/// Level state (cleared on each map change).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelLocals {
    pub framenum: i64,
    pub time: GameTime,
    pub level_name: FixedString<MAX_QPATH>,
    pub mapname: FixedString<MAX_QPATH>,
    pub nextmap: FixedString<MAX_QPATH>,
    pub intermission_time: GameTime,
    pub changemap: LevelString,
    pub exitintermission: bool,
    pub intermission_origin: Vec3,
    pub intermission_angle: Vec3,
    pub sight_client: EntityRef,
    pub sight_entity: EntityRef,
    pub sight_entity_framenum: i64,
    pub sound_entity: EntityRef,
    pub sound_entity_framenum: i64,
    pub sound2_entity: EntityRef,
    pub sound2_entity_framenum: i64,
    pub pic_health: i32,
    pub total_secrets: i32,
    pub found_secrets: i32,
    pub total_goals: i32,
    pub found_goals: i32,
    pub total_monsters: i32,
    pub killed_monsters: i32,
    pub body_que: i32,
    pub power_cubes: i32,
    pub start_items: LevelString,
    pub instantitems: bool,
    pub shadow_light_info: TagVec<ShadowLightInfo, LevelTag>,
    pub health_bar_entities: [EntityRef; MAX_HEALTH_BARS],
    pub story_active: bool,
    pub next_auto_save: GameTime,

    // not persisted
    pub current_entity: EntityRef,
    pub entry: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PmoveState {
    pub pm_type: PmType,
    pub origin: Vec3,
    pub velocity: Vec3,
    pub pm_flags: PmFlags,
    pub pm_time: u16,
    pub gravity: i16,
    pub delta_angles: Vec3,
    pub viewheight: i8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
    pub pmove: PmoveState,
    pub viewangles: Vec3,
    pub viewoffset: Vec3,
    pub kick_angles: Vec3,
    pub gunangles: Vec3,
    pub gunoffset: Vec3,
    pub gunindex: i32,
    pub gunframe: i32,
    pub blend: [f32; 4],
    pub fov: f32,
    pub rdflags: i32,
    pub stats: [i16; MAX_STATS],
    pub team_id: u8,
}

/// Client persistent data (survives respawns in DM, survives level changes).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientPersistant {
    pub userinfo: FixedString<MAX_INFO_STRING>,
    pub netname: FixedString<MAX_NETNAME>,
    pub hand: i32,
    pub connected: bool,
    pub spawned: bool,
    pub health: i32,
    pub max_health: i32,
    pub saved_flags: EntityFlags,
    pub selected_item: ItemId,
    pub inventory: Inventory,
    pub max_ammo: [i16; AMMO_MAX],
    pub weapon: Option<ItemId>,
    pub lastweapon: Option<ItemId>,
    pub power_cubes: i32,
    pub score: i32,
    pub game_help1changed: i32,
    pub game_help2changed: i32,
    pub helpchanged: i32,
    pub spectator: bool,
    pub lives: i32,
}

/// Client data that stays across deathmatch respawns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientRespawn {
    pub coop_respawn: ClientPersistant,
    pub entertime: GameTime,
    pub score: i32,
    pub cmd_angles: Vec3,
    pub spectator: bool,
}

/// Full game client structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GClient {
    pub ps: PlayerState,
    pub ping: i32,

    pub pers: ClientPersistant,
    pub resp: ClientRespawn,
    pub old_pmove: PmoveState,

    pub showscores: bool,
    pub showinventory: bool,
    pub showhelp: bool,

    pub buttons: u32,
    pub oldbuttons: u32,
    pub latched_buttons: u32,
    pub weapon_thunk: bool,
    pub newweapon: Option<ItemId>,

    pub damage_armor: i32,
    pub damage_parmor: i32,
    pub damage_blood: i32,
    pub damage_knockback: i32,
    pub damage_from: Vec3,

    pub killer_yaw: f32,
    pub weaponstate: WeaponState,
    pub kick_angles: Vec3,
    pub kick_origin: Vec3,
    pub v_dmg_roll: f32,
    pub v_dmg_pitch: f32,
    pub v_dmg_time: GameTime,
    pub fall_time: GameTime,
    pub fall_value: f32,
    pub damage_alpha: f32,
    pub bonus_alpha: f32,
    pub damage_blend: Vec3,
    pub v_angle: Vec3,
    pub bobtime: f32,
    pub oldviewangles: Vec3,
    pub oldvelocity: Vec3,

    pub next_drown_time: GameTime,
    pub old_waterlevel: WaterLevel,
    pub breather_sound: i32,
    pub machinegun_shots: i32,

    pub anim_end: i32,
    pub anim_priority: i32,
    pub anim_duck: bool,
    pub anim_run: bool,

    pub quad_time: GameTime,
    pub invincible_time: GameTime,
    pub breather_time: GameTime,
    pub enviro_time: GameTime,

    pub grenade_blew_up: bool,
    pub grenade_time: GameTime,
    pub silencer_shots: i32,
    pub weapon_sound: i32,

    pub pickup_msg_time: GameTime,
    pub flood_locktill: GameTime,
    pub flood_when: [GameTime; FLOOD_HISTORY],
    pub flood_whenhead: i32,
    pub respawn_time: GameTime,

    pub chase_target: EntityRef,
    pub update_chase: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    pub number: u32,
    pub origin: Vec3,
    pub angles: Vec3,
    pub old_origin: Vec3,
    pub modelindex: i32,
    pub modelindex2: i32,
    pub modelindex3: i32,
    pub modelindex4: i32,
    pub frame: i32,
    pub skinnum: i32,
    pub effects: u64,
    pub renderfx: u32,
    pub sound: i32,
    pub alpha: f32,
    pub scale: f32,
    pub instance_bits: u8,

    // transient, never persisted
    pub event: i32,
}

/// Movement info for movers (doors, plats, etc.)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveInfo {
    pub start_origin: Vec3,
    pub start_angles: Vec3,
    pub end_origin: Vec3,
    pub end_angles: Vec3,
    pub sound_start: i32,
    pub sound_middle: i32,
    pub sound_end: i32,
    pub accel: f32,
    pub speed: f32,
    pub decel: f32,
    pub distance: f32,
    pub wait: f32,
    pub state: MoveState,
    pub reversing: bool,
    pub dir: Vec3,
    pub dest: Vec3,
    pub current_speed: f32,
    pub move_speed: f32,
    pub next_speed: f32,
    pub remaining_distance: f32,
    pub decel_distance: f32,
    pub endfunc: SaveData<MoveEndTag>,
    pub blocked: SaveData<BlockedTag>,
}

/// Monster AI info.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonsterInfo {
    pub active_move: SaveData<MMoveTag>,
    pub next_move: SaveData<MMoveTag>,
    pub aiflags: AiFlags,
    pub nextframe: i32,
    pub scale: f32,

    pub stand: SaveData<MonsterThinkTag>,
    pub idle: SaveData<MonsterThinkTag>,
    pub search: SaveData<MonsterThinkTag>,
    pub walk: SaveData<MonsterThinkTag>,
    pub run: SaveData<MonsterThinkTag>,
    pub attack: SaveData<MonsterThinkTag>,
    pub melee: SaveData<MonsterThinkTag>,
    pub sight: SaveData<MonsterThinkTag>,
    pub checkattack: SaveData<CheckAttackTag>,

    pub pausetime: GameTime,
    pub attack_finished: GameTime,
    pub saved_goal: Vec3,
    pub search_time: GameTime,
    pub trail_time: GameTime,
    pub last_sighting: Vec3,
    pub attack_state: AttackState,
    pub lefty: bool,
    pub idle_time: GameTime,
    pub linkcount: i32,

    pub power_armor_type: ItemId,
    pub power_armor_power: i32,
    pub initial_power_armor_type: ItemId,
    pub max_power_armor_power: i32,
    pub weapon_sound: i32,
    pub engine_sound: i32,

    pub reinforcements: ReinforcementList,
    pub chosen_reinforcements: [u8; MAX_REINFORCEMENTS],
    pub monster_slots: i32,
    pub monster_used: i32,
}

/// Full edict structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edict {
    pub s: EntityState,
    pub client: Option<usize>, // index into clients, bound on load
    pub inuse: bool,
    pub linkcount: i32,
    pub svflags: SvFlags,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub solid: Solid,
    pub clipmask: u32,
    pub owner: EntityRef,

    pub movetype: MoveType,
    pub flags: EntityFlags,
    pub model: LevelString,
    pub freetime: GameTime,
    pub message: LevelString,
    pub classname: LevelString,
    pub spawnflags: u32,
    pub timestamp: GameTime,
    pub angle: f32,
    pub target: LevelString,
    pub targetname: LevelString,
    pub killtarget: LevelString,
    pub team: LevelString,
    pub pathtarget: LevelString,
    pub deathtarget: LevelString,
    pub combattarget: LevelString,
    pub target_ent: EntityRef,

    pub speed: f32,
    pub accel: f32,
    pub decel: f32,
    pub movedir: Vec3,
    pub pos1: Vec3,
    pub pos2: Vec3,

    pub velocity: Vec3,
    pub avelocity: Vec3,
    pub mass: i32,
    pub air_finished: GameTime,
    pub gravity: f32,
    pub gravity_vector: Vec3,

    pub goalentity: EntityRef,
    pub movetarget: EntityRef,
    pub yaw_speed: f32,
    pub ideal_yaw: f32,

    pub nextthink: GameTime,
    pub prethink: SaveData<ThinkTag>,
    pub think: SaveData<ThinkTag>,
    pub touch: SaveData<TouchTag>,
    pub use_fn: SaveData<UseTag>,
    pub pain: SaveData<PainTag>,
    pub die: SaveData<DieTag>,

    pub touch_debounce_time: GameTime,
    pub pain_debounce_time: GameTime,
    pub damage_debounce_time: GameTime,
    pub fly_sound_debounce_time: GameTime,
    pub last_move_time: GameTime,

    pub health: i32,
    pub max_health: i32,
    pub gib_health: i32,
    pub deadflag: DeadFlag,
    pub show_hostile: GameTime,
    pub powerarmor_time: GameTime,
    pub map: LevelString,

    pub viewheight: i32,
    pub takedamage: Damage,
    pub dmg: i32,
    pub radius_dmg: i32,
    pub dmg_radius: f32,
    pub sounds: i32,
    pub count: i32,

    pub chain: EntityRef,
    pub enemy: EntityRef,
    pub oldenemy: EntityRef,
    pub activator: EntityRef,
    pub groundentity: EntityRef,
    pub groundentity_linkcount: i32,
    pub teamchain: EntityRef,
    pub teammaster: EntityRef,
    pub mynoise: EntityRef,
    pub mynoise2: EntityRef,

    pub noise_index: i32,
    pub noise_index2: i32,
    pub volume: f32,
    pub attenuation: f32,

    pub wait: f32,
    pub delay: f32,
    pub random: f32,

    pub teleport_time: GameTime,

    pub watertype: i32,
    pub waterlevel: WaterLevel,

    pub move_origin: Vec3,
    pub move_angles: Vec3,

    pub style: i32,
    pub crosslevel_flags: u32,

    pub item: Option<ItemId>,
    pub item_picked_up_by: BitSet<MAX_CLIENTS>,

    pub moveinfo: MoveInfo,
    pub monsterinfo: MonsterInfo,
}

impl Edict {
    /// A fresh in-use edict for slot `number`, as G_InitEdict leaves it.
    pub fn spawned(number: usize) -> Self {
        let mut e = Edict::default();
        e.inuse = true;
        e.s.number = number as u32;
        e.gravity = 1.0;
        e.gravity_vector = [0.0, 0.0, -1.0];
        e
    }

    pub fn classname_is(&self, classname: &str) -> bool {
        self.classname.eq_str(classname)
    }
}

// ============================================================
// Entity table
// ============================================================

/// Generational slot arena of edicts. Slot 0 is the world and slots
/// `1..=max_clients` belong to players.
#[derive(Debug, Clone)]
pub struct EntityTable {
    edicts: Vec<Edict>,
    generations: Vec<u32>,
    num_edicts: usize,
    max_clients: usize,
}

impl EntityTable {
    pub fn new(max_entities: usize, max_clients: usize) -> Self {
        let mut edicts = Vec::with_capacity(max_entities);
        edicts.resize_with(max_entities, Edict::default);
        EntityTable {
            edicts,
            generations: vec![0; max_entities],
            num_edicts: (max_clients + 1).min(max_entities),
            max_clients,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// One past the highest slot ever handed out.
    pub fn num_edicts(&self) -> usize {
        self.num_edicts
    }

    pub fn get(&self, index: usize) -> Option<&Edict> {
        self.edicts.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Edict> {
        self.edicts.get_mut(index)
    }

    pub fn id(&self, index: usize) -> Option<EntityId> {
        self.generations.get(index).map(|&g| EntityId::new(index as u32, g))
    }

    /// The edict `id` names, unless its slot has been freed since.
    pub fn resolve(&self, id: EntityId) -> Option<&Edict> {
        if self.is_current(id) {
            self.edicts.get(id.index())
        } else {
            None
        }
    }

    /// Takes the first free non-client slot, like G_Spawn.
    pub fn spawn(&mut self) -> Option<EntityId> {
        let first = self.max_clients + 1;
        let index = (first..self.num_edicts)
            .find(|&i| !self.edicts[i].inuse)
            .or_else(|| {
                let next = self.num_edicts.max(first);
                (next < self.edicts.len()).then_some(next)
            })?;
        self.edicts[index] = Edict::spawned(index);
        self.num_edicts = self.num_edicts.max(index + 1);
        self.id(index)
    }

    /// Releases a slot. Handles to it stop resolving.
    pub fn free(&mut self, index: usize) {
        if let Some(e) = self.edicts.get_mut(index) {
            *e = Edict::default();
            e.s.number = index as u32;
            self.generations[index] = self.generations[index].wrapping_add(1);
        }
    }

    /// Empty table of the same shape whose handles are all newer than ours.
    pub fn wiped(&self) -> EntityTable {
        let mut table = EntityTable::new(self.edicts.len(), self.max_clients);
        for (g, &old) in table.generations.iter_mut().zip(&self.generations) {
            *g = old.wrapping_add(1);
        }
        table
    }

    /// Installs a loaded edict at `index`.
    pub fn restore(&mut self, index: usize, mut edict: Edict) -> bool {
        let Some(slot) = self.edicts.get_mut(index) else {
            return false;
        };
        edict.inuse = true;
        edict.s.number = index as u32;
        *slot = edict;
        self.num_edicts = self.num_edicts.max(index + 1);
        true
    }

    pub fn iter_in_use(&self) -> impl Iterator<Item = (usize, &Edict)> + '_ {
        self.edicts[..self.num_edicts].iter().enumerate().filter(|(_, e)| e.inuse)
    }

    /// Indices of in-use edicts whose class is `classname`.
    pub fn find_by_classname(&self, classname: &str) -> Vec<usize> {
        self.iter_in_use().filter(|(_, e)| e.classname_is(classname)).map(|(i, _)| i).collect()
    }
}

impl EntityResolver for EntityTable {
    fn max_entities(&self) -> usize {
        self.edicts.len()
    }

    fn entity_id(&self, index: usize) -> Option<EntityId> {
        self.id(index)
    }
}

// ============================================================
// Resource index caches
// ============================================================

/// Memoized resource indices. Indices are only valid for the server
/// instance that handed them out, so every load resets them.
#[derive(Debug, Clone, Default)]
pub struct ResourceCaches {
    sounds: HashMap<String, i32>,
    models: HashMap<String, i32>,
    images: HashMap<String, i32>,
}

impl ResourceCaches {
    pub fn sound(&mut self, gi: &dyn GameImport, name: &str) -> i32 {
        *self.sounds.entry(name.to_string()).or_insert_with(|| gi.soundindex(name))
    }

    pub fn model(&mut self, gi: &dyn GameImport, name: &str) -> i32 {
        *self.models.entry(name.to_string()).or_insert_with(|| gi.modelindex(name))
    }

    pub fn image(&mut self, gi: &dyn GameImport, name: &str) -> i32 {
        *self.images.entry(name.to_string()).or_insert_with(|| gi.imageindex(name))
    }

    pub fn len(&self) -> usize {
        self.sounds.len() + self.models.len() + self.images.len()
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn reset_all(&mut self) {
        self.sounds.clear();
        self.models.clear();
        self.images.clear();
    }
}

// ============================================================
// Unified Game Context
// ============================================================

/// Owner of all mutable game state.
#[derive(Debug)]
pub struct GameCtx {
    pub game: GameLocals,
    pub level: LevelLocals,
    pub clients: Vec<GClient>,
    pub entities: EntityTable,
    pub items: ItemList,
    pub arena: TagArena,
    pub caches: ResourceCaches,
    pub deathmatch: bool,
    pub coop: bool,
}

impl GameCtx {
    pub fn new(max_clients: usize, max_entities: usize) -> Self {
        let mut game = GameLocals::default();
        game.maxclients = max_clients as u32;
        game.maxentities = max_entities as u32;
        let mut clients = Vec::with_capacity(max_clients);
        clients.resize_with(max_clients, GClient::default);
        GameCtx {
            game,
            level: LevelLocals::default(),
            clients,
            entities: EntityTable::new(max_entities, max_clients),
            items: ItemList::standard(),
            arena: TagArena::new(),
            caches: ResourceCaches::default(),
            deathmatch: false,
            coop: false,
        }
    }

    pub fn maxclients(&self) -> usize {
        self.game.maxclients as usize
    }

    /// The client bound to edict `ent_idx`, if any.
    pub fn client_of(&self, ent_idx: usize) -> Option<&GClient> {
        let client = self.entities.get(ent_idx)?.client?;
        self.clients.get(client)
    }
}
