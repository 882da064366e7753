// g_save.rs — Save/load game and level state

use std::sync::OnceLock;

use rayon::prelude::*;
use serde_json::{Map, Value};

use q2save_common::save_data::SaveDataRegistry;
use q2save_common::save_env::{EntityResolver, FixedEntities, SaveEnv};
use q2save_common::save_read::{read_save_struct, ReadCtx};
use q2save_common::save_struct::{SaveStruct, SchemaRegistry, StructDescriptor};
use q2save_common::save_write::{write_save_struct, WriteCtx};
use q2save_common::tag_arena::MemoryTag;
use q2save_common::{field, save_struct};
use q2save_common::{SaveDocument, SaveError, SaveWarning};

use crate::dispatch::register_save_data;
use crate::g_items::precache_inventory_items;
use crate::g_local::*;
use crate::game_import::{GameImport, CS_SHADOWLIGHTS};

/// Entity count above which level entities are serialized in parallel.
const PARALLEL_SAVE_THRESHOLD: usize = 32;

// ============================================================
// Schemas
// ============================================================

save_struct!(LevelEntry {
    field!("map_name", LevelEntry, map_name),
    field!("pretty_name", LevelEntry, pretty_name),
    field!("total_secrets", LevelEntry, total_secrets),
    field!("found_secrets", LevelEntry, found_secrets),
    field!("total_monsters", LevelEntry, total_monsters),
    field!("killed_monsters", LevelEntry, killed_monsters),
    field!("time", LevelEntry, time),
    field!("visit_order", LevelEntry, visit_order),
});

save_struct!(GameLocals {
    field!("helpmessage1", GameLocals, helpmessage1),
    field!("helpmessage2", GameLocals, helpmessage2),
    field!("help1changed", GameLocals, help1changed),
    field!("help2changed", GameLocals, help2changed),
    field!("spawnpoint", GameLocals, spawnpoint),
    field!("maxclients", GameLocals, maxclients),
    field!("maxentities", GameLocals, maxentities),
    field!("cross_level_flags", GameLocals, cross_level_flags),
    field!("cross_unit_flags", GameLocals, cross_unit_flags),
    field!("autosaved", GameLocals, autosaved),
    field!("level_entries", GameLocals, level_entries),
});

save_struct!(ShadowLightInfo {
    field!("entity_number", ShadowLightInfo, entity_number),
    field!("lighttype", ShadowLightInfo, lighttype),
    field!("radius", ShadowLightInfo, radius),
    field!("resolution", ShadowLightInfo, resolution),
    field!("intensity", ShadowLightInfo, intensity),
    field!("fade_start", ShadowLightInfo, fade_start),
    field!("fade_end", ShadowLightInfo, fade_end),
    field!("lightstyle", ShadowLightInfo, lightstyle),
    field!("coneangle", ShadowLightInfo, coneangle),
    field!("conedirection", ShadowLightInfo, conedirection),
});

save_struct!(LevelLocals {
    field!("framenum", LevelLocals, framenum),
    field!("time", LevelLocals, time),
    field!("level_name", LevelLocals, level_name),
    field!("mapname", LevelLocals, mapname),
    field!("nextmap", LevelLocals, nextmap),
    field!("intermission_time", LevelLocals, intermission_time),
    field!("changemap", LevelLocals, changemap),
    field!("exitintermission", LevelLocals, exitintermission),
    field!("intermission_origin", LevelLocals, intermission_origin),
    field!("intermission_angle", LevelLocals, intermission_angle),
    field!("sight_client", LevelLocals, sight_client),
    field!("sight_entity", LevelLocals, sight_entity),
    field!("sight_entity_framenum", LevelLocals, sight_entity_framenum),
    field!("sound_entity", LevelLocals, sound_entity),
    field!("sound_entity_framenum", LevelLocals, sound_entity_framenum),
    field!("sound2_entity", LevelLocals, sound2_entity),
    field!("sound2_entity_framenum", LevelLocals, sound2_entity_framenum),
    field!("pic_health", LevelLocals, pic_health),
    field!("total_secrets", LevelLocals, total_secrets),
    field!("found_secrets", LevelLocals, found_secrets),
    field!("total_goals", LevelLocals, total_goals),
    field!("found_goals", LevelLocals, found_goals),
    field!("total_monsters", LevelLocals, total_monsters),
    field!("killed_monsters", LevelLocals, killed_monsters),
    field!("body_que", LevelLocals, body_que),
    field!("power_cubes", LevelLocals, power_cubes),
    field!("start_items", LevelLocals, start_items),
    field!("instantitems", LevelLocals, instantitems),
    field!("shadow_light_info", LevelLocals, shadow_light_info),
    field!("health_bar_entities", LevelLocals, health_bar_entities),
    field!("story_active", LevelLocals, story_active),
    field!("next_auto_save", LevelLocals, next_auto_save),
});

save_struct!(PmoveState {
    field!("pm_type", PmoveState, pm_type),
    field!("origin", PmoveState, origin),
    field!("velocity", PmoveState, velocity),
    field!("pm_flags", PmoveState, pm_flags),
    field!("pm_time", PmoveState, pm_time),
    field!("gravity", PmoveState, gravity),
    field!("delta_angles", PmoveState, delta_angles),
    field!("viewheight", PmoveState, viewheight),
});

save_struct!(PlayerState {
    field!("pmove", PlayerState, pmove),
    field!("viewangles", PlayerState, viewangles),
    field!("viewoffset", PlayerState, viewoffset),
    field!("kick_angles", PlayerState, kick_angles),
    field!("gunangles", PlayerState, gunangles),
    field!("gunoffset", PlayerState, gunoffset),
    field!("gunindex", PlayerState, gunindex),
    field!("gunframe", PlayerState, gunframe),
    field!("blend", PlayerState, blend),
    field!("fov", PlayerState, fov),
    field!("rdflags", PlayerState, rdflags),
    field!("stats", PlayerState, stats),
    field!("team_id", PlayerState, team_id),
});

save_struct!(ClientPersistant {
    field!("userinfo", ClientPersistant, userinfo),
    field!("netname", ClientPersistant, netname),
    field!("hand", ClientPersistant, hand),
    field!("connected", ClientPersistant, connected),
    field!("spawned", ClientPersistant, spawned),
    field!("health", ClientPersistant, health),
    field!("max_health", ClientPersistant, max_health),
    field!("saved_flags", ClientPersistant, saved_flags),
    field!("selected_item", ClientPersistant, selected_item),
    field!("inventory", ClientPersistant, inventory),
    field!("max_ammo", ClientPersistant, max_ammo),
    field!("weapon", ClientPersistant, weapon),
    field!("lastweapon", ClientPersistant, lastweapon),
    field!("power_cubes", ClientPersistant, power_cubes),
    field!("score", ClientPersistant, score),
    field!("game_help1changed", ClientPersistant, game_help1changed),
    field!("game_help2changed", ClientPersistant, game_help2changed),
    field!("helpchanged", ClientPersistant, helpchanged),
    field!("spectator", ClientPersistant, spectator),
    field!("lives", ClientPersistant, lives),
});

save_struct!(ClientRespawn {
    field!("coop_respawn", ClientRespawn, coop_respawn),
    field!("entertime", ClientRespawn, entertime),
    field!("score", ClientRespawn, score),
    field!("cmd_angles", ClientRespawn, cmd_angles),
    field!("spectator", ClientRespawn, spectator),
});

// ping is re-measured by the server and never saved
save_struct!(GClient {
    field!("ps", GClient, ps),
    field!("pers", GClient, pers),
    field!("resp", GClient, resp),
    field!("old_pmove", GClient, old_pmove),
    field!("showscores", GClient, showscores),
    field!("showinventory", GClient, showinventory),
    field!("showhelp", GClient, showhelp),
    field!("buttons", GClient, buttons),
    field!("oldbuttons", GClient, oldbuttons),
    field!("latched_buttons", GClient, latched_buttons),
    field!("weapon_thunk", GClient, weapon_thunk),
    field!("newweapon", GClient, newweapon),
    field!("damage_armor", GClient, damage_armor),
    field!("damage_parmor", GClient, damage_parmor),
    field!("damage_blood", GClient, damage_blood),
    field!("damage_knockback", GClient, damage_knockback),
    field!("damage_from", GClient, damage_from),
    field!("killer_yaw", GClient, killer_yaw),
    field!("weaponstate", GClient, weaponstate),
    field!("kick_angles", GClient, kick_angles),
    field!("kick_origin", GClient, kick_origin),
    field!("v_dmg_roll", GClient, v_dmg_roll),
    field!("v_dmg_pitch", GClient, v_dmg_pitch),
    field!("v_dmg_time", GClient, v_dmg_time),
    field!("fall_time", GClient, fall_time),
    field!("fall_value", GClient, fall_value),
    field!("damage_alpha", GClient, damage_alpha),
    field!("bonus_alpha", GClient, bonus_alpha),
    field!("damage_blend", GClient, damage_blend),
    field!("v_angle", GClient, v_angle),
    field!("bobtime", GClient, bobtime),
    field!("oldviewangles", GClient, oldviewangles),
    field!("oldvelocity", GClient, oldvelocity),
    field!("next_drown_time", GClient, next_drown_time),
    field!("old_waterlevel", GClient, old_waterlevel),
    field!("breather_sound", GClient, breather_sound),
    field!("machinegun_shots", GClient, machinegun_shots),
    field!("anim_end", GClient, anim_end),
    field!("anim_priority", GClient, anim_priority),
    field!("anim_duck", GClient, anim_duck),
    field!("anim_run", GClient, anim_run),
    field!("quad_time", GClient, quad_time),
    field!("invincible_time", GClient, invincible_time),
    field!("breather_time", GClient, breather_time),
    field!("enviro_time", GClient, enviro_time),
    field!("grenade_blew_up", GClient, grenade_blew_up),
    field!("grenade_time", GClient, grenade_time),
    field!("silencer_shots", GClient, silencer_shots),
    field!("weapon_sound", GClient, weapon_sound),
    field!("pickup_msg_time", GClient, pickup_msg_time),
    field!("flood_locktill", GClient, flood_locktill),
    field!("flood_when", GClient, flood_when),
    field!("flood_whenhead", GClient, flood_whenhead),
    field!("respawn_time", GClient, respawn_time),
    field!("chase_target", GClient, chase_target),
    field!("update_chase", GClient, update_chase),
});

save_struct!(MoveInfo {
    field!("start_origin", MoveInfo, start_origin),
    field!("start_angles", MoveInfo, start_angles),
    field!("end_origin", MoveInfo, end_origin),
    field!("end_angles", MoveInfo, end_angles),
    field!("sound_start", MoveInfo, sound_start),
    field!("sound_middle", MoveInfo, sound_middle),
    field!("sound_end", MoveInfo, sound_end),
    field!("accel", MoveInfo, accel),
    field!("speed", MoveInfo, speed),
    field!("decel", MoveInfo, decel),
    field!("distance", MoveInfo, distance),
    field!("wait", MoveInfo, wait),
    field!("state", MoveInfo, state),
    field!("reversing", MoveInfo, reversing),
    field!("dir", MoveInfo, dir),
    field!("dest", MoveInfo, dest),
    field!("current_speed", MoveInfo, current_speed),
    field!("move_speed", MoveInfo, move_speed),
    field!("next_speed", MoveInfo, next_speed),
    field!("remaining_distance", MoveInfo, remaining_distance),
    field!("decel_distance", MoveInfo, decel_distance),
    field!("endfunc", MoveInfo, endfunc),
    field!("blocked", MoveInfo, blocked),
});

save_struct!(MonsterInfo {
    field!("active_move", MonsterInfo, active_move),
    field!("next_move", MonsterInfo, next_move),
    field!("aiflags", MonsterInfo, aiflags),
    field!("nextframe", MonsterInfo, nextframe),
    field!("scale", MonsterInfo, scale),
    field!("stand", MonsterInfo, stand),
    field!("idle", MonsterInfo, idle),
    field!("search", MonsterInfo, search),
    field!("walk", MonsterInfo, walk),
    field!("run", MonsterInfo, run),
    field!("attack", MonsterInfo, attack),
    field!("melee", MonsterInfo, melee),
    field!("sight", MonsterInfo, sight),
    field!("checkattack", MonsterInfo, checkattack),
    field!("pausetime", MonsterInfo, pausetime),
    field!("attack_finished", MonsterInfo, attack_finished),
    field!("saved_goal", MonsterInfo, saved_goal),
    field!("search_time", MonsterInfo, search_time),
    field!("trail_time", MonsterInfo, trail_time),
    field!("last_sighting", MonsterInfo, last_sighting),
    field!("attack_state", MonsterInfo, attack_state),
    field!("lefty", MonsterInfo, lefty),
    field!("idle_time", MonsterInfo, idle_time),
    field!("linkcount", MonsterInfo, linkcount),
    field!("power_armor_type", MonsterInfo, power_armor_type),
    field!("power_armor_power", MonsterInfo, power_armor_power),
    field!("initial_power_armor_type", MonsterInfo, initial_power_armor_type),
    field!("max_power_armor_power", MonsterInfo, max_power_armor_power),
    field!("weapon_sound", MonsterInfo, weapon_sound),
    field!("engine_sound", MonsterInfo, engine_sound),
    field!("reinforcements", MonsterInfo, reinforcements),
    field!("chosen_reinforcements", MonsterInfo, chosen_reinforcements),
    field!("monster_slots", MonsterInfo, monster_slots),
    field!("monster_used", MonsterInfo, monster_used),
});

fn gravity_is_default(v: &dyn std::any::Any) -> bool {
    v.downcast_ref::<f32>().is_some_and(|g| *g == 1.0)
}

fn gravity_vector_is_default(v: &dyn std::any::Any) -> bool {
    v.downcast_ref::<Vec3>().is_some_and(|g| *g == [0.0, 0.0, -1.0])
}

// The entity state is flattened into the edict as `s.*`; its number is the
// document key, and inuse/linkcount/client are rebuilt on load.
save_struct!(Edict {
    field!("s.origin", Edict, s.origin),
    field!("s.angles", Edict, s.angles),
    field!("s.old_origin", Edict, s.old_origin),
    field!("s.modelindex", Edict, s.modelindex),
    field!("s.modelindex2", Edict, s.modelindex2),
    field!("s.modelindex3", Edict, s.modelindex3),
    field!("s.modelindex4", Edict, s.modelindex4),
    field!("s.frame", Edict, s.frame),
    field!("s.skinnum", Edict, s.skinnum),
    field!("s.effects", Edict, s.effects),
    field!("s.renderfx", Edict, s.renderfx),
    field!("s.sound", Edict, s.sound),
    field!("s.alpha", Edict, s.alpha),
    field!("s.scale", Edict, s.scale),
    field!("s.instance_bits", Edict, s.instance_bits),
    field!("svflags", Edict, svflags),
    field!("mins", Edict, mins),
    field!("maxs", Edict, maxs),
    field!("solid", Edict, solid),
    field!("clipmask", Edict, clipmask),
    field!("owner", Edict, owner),
    field!("movetype", Edict, movetype),
    field!("flags", Edict, flags),
    field!("model", Edict, model),
    field!("freetime", Edict, freetime),
    field!("message", Edict, message),
    field!("classname", Edict, classname),
    field!("spawnflags", Edict, spawnflags),
    field!("timestamp", Edict, timestamp),
    field!("angle", Edict, angle),
    field!("target", Edict, target),
    field!("targetname", Edict, targetname),
    field!("killtarget", Edict, killtarget),
    field!("team", Edict, team),
    field!("pathtarget", Edict, pathtarget),
    field!("deathtarget", Edict, deathtarget),
    field!("combattarget", Edict, combattarget),
    field!("target_ent", Edict, target_ent),
    field!("speed", Edict, speed),
    field!("accel", Edict, accel),
    field!("decel", Edict, decel),
    field!("movedir", Edict, movedir),
    field!("pos1", Edict, pos1),
    field!("pos2", Edict, pos2),
    field!("velocity", Edict, velocity),
    field!("avelocity", Edict, avelocity),
    field!("mass", Edict, mass),
    field!("air_finished", Edict, air_finished),
    field!("gravity", Edict, gravity).with_is_empty(gravity_is_default),
    field!("gravity_vector", Edict, gravity_vector).with_is_empty(gravity_vector_is_default),
    field!("goalentity", Edict, goalentity),
    field!("movetarget", Edict, movetarget),
    field!("yaw_speed", Edict, yaw_speed),
    field!("ideal_yaw", Edict, ideal_yaw),
    field!("nextthink", Edict, nextthink),
    field!("prethink", Edict, prethink),
    field!("think", Edict, think),
    field!("touch", Edict, touch),
    field!("use", Edict, use_fn),
    field!("pain", Edict, pain),
    field!("die", Edict, die),
    field!("touch_debounce_time", Edict, touch_debounce_time),
    field!("pain_debounce_time", Edict, pain_debounce_time),
    field!("damage_debounce_time", Edict, damage_debounce_time),
    field!("fly_sound_debounce_time", Edict, fly_sound_debounce_time),
    field!("last_move_time", Edict, last_move_time),
    field!("health", Edict, health),
    field!("max_health", Edict, max_health),
    field!("gib_health", Edict, gib_health),
    field!("deadflag", Edict, deadflag),
    field!("show_hostile", Edict, show_hostile),
    field!("powerarmor_time", Edict, powerarmor_time),
    field!("map", Edict, map),
    field!("viewheight", Edict, viewheight),
    field!("takedamage", Edict, takedamage),
    field!("dmg", Edict, dmg),
    field!("radius_dmg", Edict, radius_dmg),
    field!("dmg_radius", Edict, dmg_radius),
    field!("sounds", Edict, sounds),
    field!("count", Edict, count),
    field!("chain", Edict, chain),
    field!("enemy", Edict, enemy),
    field!("oldenemy", Edict, oldenemy),
    field!("activator", Edict, activator),
    field!("groundentity", Edict, groundentity),
    field!("groundentity_linkcount", Edict, groundentity_linkcount),
    field!("teamchain", Edict, teamchain),
    field!("teammaster", Edict, teammaster),
    field!("mynoise", Edict, mynoise),
    field!("mynoise2", Edict, mynoise2),
    field!("noise_index", Edict, noise_index),
    field!("noise_index2", Edict, noise_index2),
    field!("volume", Edict, volume),
    field!("attenuation", Edict, attenuation),
    field!("wait", Edict, wait),
    field!("delay", Edict, delay),
    field!("random", Edict, random),
    field!("teleport_time", Edict, teleport_time),
    field!("watertype", Edict, watertype),
    field!("waterlevel", Edict, waterlevel),
    field!("move_origin", Edict, move_origin),
    field!("move_angles", Edict, move_angles),
    field!("style", Edict, style),
    field!("crosslevel_flags", Edict, crosslevel_flags),
    field!("item", Edict, item),
    field!("item_picked_up_by", Edict, item_picked_up_by),
    field!("moveinfo", Edict, moveinfo),
    field!("monsterinfo", Edict, monsterinfo),
});

// ============================================================
// Registries
// ============================================================

/// Schemas and named pointers, built once at startup and read-only after.
#[derive(Debug)]
pub struct SaveRegistries {
    pub schemas: SchemaRegistry,
    pub pointers: SaveDataRegistry,
}

impl SaveRegistries {
    /// The finalized schema for `T`; documents are only walked through registered schemas.
    pub fn schema<T: SaveStruct>(&self) -> Result<&'static StructDescriptor, SaveError> {
        let name = T::save_struct().name;
        self.schemas
            .get(name)
            .ok_or_else(|| SaveError::registration(format!("schema {name} is not registered")))
    }
}

/// Builds and validates both registries. A registration problem is fatal.
pub fn build_save_registries(strict: bool) -> Result<SaveRegistries, SaveError> {
    let mut schemas = SchemaRegistry::new();
    schemas.register::<GameLocals>()?;
    schemas.register::<GClient>()?;
    schemas.register::<LevelLocals>()?;
    schemas.register::<Edict>()?;
    schemas.finalize()?;

    let mut pointers = SaveDataRegistry::new();
    register_save_data(&mut pointers)?;
    let duplicates = pointers.finalize(strict)?;

    log::info!(
        "InitSave: {} schemas, {} named pointers ({} duplicates ignored)",
        schemas.len(),
        pointers.len(),
        duplicates.len()
    );
    Ok(SaveRegistries { schemas, pointers })
}

static REGISTRIES: OnceLock<SaveRegistries> = OnceLock::new();

/// The process-wide registries, built on first use.
pub fn init_save(strict: bool) -> Result<&'static SaveRegistries, SaveError> {
    if let Some(registries) = REGISTRIES.get() {
        return Ok(registries);
    }
    let built = build_save_registries(strict)?;
    Ok(REGISTRIES.get_or_init(|| built))
}

// ============================================================
// Configuration
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveConfig {
    /// Turns every recoverable load problem into a failure.
    pub strict: bool,
    /// Largest entity table a game document may ask for.
    pub max_entities: usize,
    /// Largest client table a game document may ask for.
    pub max_clients: usize,
}

impl Default for SaveConfig {
    fn default() -> Self {
        SaveConfig { strict: false, max_entities: MAX_EDICTS, max_clients: MAX_CLIENTS }
    }
}

impl SaveConfig {
    /// Reads `g_strict_saves`, registering it with its default if needed.
    pub fn from_cvars(gi: &dyn GameImport) -> Self {
        SaveConfig { strict: gi.cvar("g_strict_saves", "0", 0) != 0.0, ..SaveConfig::default() }
    }
}

// ============================================================
// Context
// ============================================================

/// What a successful load recovered from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub warnings: Vec<SaveWarning>,
    /// Entities restored (level loads only).
    pub entities: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Everything a save or load entry point works against.
pub struct SaveContext<'a> {
    pub game: &'a mut GameCtx,
    pub registries: &'a SaveRegistries,
    pub gi: &'a dyn GameImport,
    pub config: SaveConfig,
}

impl<'a> SaveContext<'a> {
    pub fn new(game: &'a mut GameCtx, registries: &'a SaveRegistries, gi: &'a dyn GameImport) -> Self {
        let config = SaveConfig::from_cvars(gi);
        SaveContext { game, registries, gi, config }
    }

    pub fn with_config(mut self, config: SaveConfig) -> Self {
        self.config = config;
        self
    }

    /// Reports an aborted load or save on the host's channels.
    fn fail(&self, what: &str, err: SaveError) -> SaveError {
        let msg = format!("{what}: {err}\n");
        if self.config.strict {
            self.gi.error(&msg);
        } else {
            self.gi.dprintf(&msg);
        }
        err
    }

    fn check_metadata(&self, doc: &SaveDocument, context: &str) -> Result<(), SaveError> {
        let failures = doc.validate_metadata(context, self.config.strict)?;
        if failures.is_empty() {
            return Ok(());
        }
        Err(SaveError::Version { context: context.to_string(), message: failures.join("; ") })
    }
}

// ============================================================
// WriteGame / ReadGame
// ============================================================

/// Copies live entity state a client keeps across levels into its
/// persistent block.
fn save_client_data(ctx: &mut GameCtx) {
    for i in 0..ctx.maxclients() {
        let Some(ent) = ctx.entities.get(i + 1) else {
            continue;
        };
        if !ent.inuse {
            continue;
        }
        let (health, max_health, flags) = (ent.health, ent.max_health, ent.flags & FL_SAVED_MASK);
        let coop = ctx.coop;
        let Some(client) = ctx.clients.get_mut(i) else {
            continue;
        };
        client.pers.health = health;
        client.pers.max_health = max_health;
        client.pers.saved_flags = flags;
        if coop {
            client.pers.score = client.resp.score;
        }
    }
}

pub fn write_game_document(ctx: &mut SaveContext<'_>, autosave: bool) -> Result<SaveDocument, SaveError> {
    if !autosave {
        save_client_data(ctx.game);
    }

    ctx.game.game.autosaved = autosave;
    let result = write_game_fields(ctx);
    ctx.game.game.autosaved = false;

    result.map_err(|e| ctx.fail("WriteGame", e))
}

fn write_game_fields(ctx: &SaveContext<'_>) -> Result<SaveDocument, SaveError> {
    let g: &GameCtx = &*ctx.game;
    let env = SaveEnv::new(&g.items, &g.entities, &ctx.registries.pointers, ctx.config.strict);
    let game_desc = ctx.registries.schema::<GameLocals>()?;
    let client_desc = ctx.registries.schema::<GClient>()?;
    let mut w = WriteCtx::new(env);

    let mut doc = SaveDocument::new();
    doc.write_metadata();

    let game = w.scoped("game", |w| write_save_struct(&g.game, game_desc, false, w))?;
    doc.insert("game", game.unwrap_or_else(|| Value::Object(Map::new())));

    let mut clients = Vec::with_capacity(g.clients.len());
    for (i, client) in g.clients.iter().enumerate() {
        let value =
            w.scoped(format!("clients[{i}]"), |w| write_save_struct(client, client_desc, false, w))?;
        clients.push(value.unwrap_or_else(|| Value::Object(Map::new())));
    }
    doc.insert("clients", Value::Array(clients));

    let warnings = w.into_warnings();
    if !warnings.is_empty() {
        ctx.gi.dprintf(&format!("WriteGame: {} fields could not be saved\n", warnings.len()));
    }
    Ok(doc)
}

/// Serializes persistent game state and every client slot.
pub fn write_game(ctx: &mut SaveContext<'_>, autosave: bool) -> Result<String, SaveError> {
    let doc = write_game_document(ctx, autosave)?;
    doc.to_json_string().map_err(|e| ctx.fail("WriteGame", e))
}

pub fn read_game_document(ctx: &mut SaveContext<'_>, doc: &SaveDocument) -> Result<LoadReport, SaveError> {
    ctx.gi.dprintf("==== ReadGame ====\n");
    match read_game_staged(ctx, doc) {
        Ok(staged) => Ok(commit_game(ctx, staged)),
        Err(e) => Err(ctx.fail("ReadGame", e)),
    }
}

/// Replaces persistent game state and all clients with the document's.
/// Nothing changes unless the whole document loads.
pub fn read_game(ctx: &mut SaveContext<'_>, text: &str) -> Result<LoadReport, SaveError> {
    let doc = SaveDocument::parse(text).map_err(|e| ctx.fail("ReadGame", e))?;
    read_game_document(ctx, &doc)
}

struct StagedGame {
    game: GameLocals,
    clients: Vec<GClient>,
    entities: EntityTable,
    arena: TagArena,
    warnings: Vec<SaveWarning>,
}

fn read_game_staged(ctx: &SaveContext<'_>, doc: &SaveDocument) -> Result<StagedGame, SaveError> {
    ctx.check_metadata(doc, "game")?;

    let game_json = doc.get("game").ok_or_else(|| SaveError::structural("game", "missing"))?;
    if !game_json.is_object() {
        return Err(SaveError::structural("game", "expected object"));
    }
    let clients_json = doc
        .get("clients")
        .and_then(Value::as_array)
        .ok_or_else(|| SaveError::structural("clients", "expected array"))?;

    let pointers = &ctx.registries.pointers;
    let strict = ctx.config.strict;
    let game_desc = ctx.registries.schema::<GameLocals>()?;
    let client_desc = ctx.registries.schema::<GClient>()?;
    let mut arena = match ctx.game.arena.limit() {
        Some(limit) => TagArena::with_limit(limit),
        None => TagArena::new(),
    };
    let mut warnings = Vec::new();

    // game locals carry no entity references
    let mut game = GameLocals::default();
    {
        let no_entities = FixedEntities::default();
        let env = SaveEnv::new(&ctx.game.items, &no_entities, pointers, strict);
        let mut r = ReadCtx::new(env, &mut arena);
        r.scoped("game", |r| read_save_struct(game_json, &mut game, game_desc, r))?;
        warnings.extend(r.into_warnings());
    }

    let maxclients = game.maxclients as usize;
    let maxentities = game.maxentities as usize;
    if maxclients == 0 || maxclients > ctx.config.max_clients {
        return Err(SaveError::Capacity(format!(
            "maxclients {maxclients} is outside 1..={}",
            ctx.config.max_clients
        )));
    }
    if maxentities <= maxclients || maxentities > ctx.config.max_entities {
        return Err(SaveError::Capacity(format!(
            "maxentities {maxentities} is outside {}..={}",
            maxclients + 1,
            ctx.config.max_entities
        )));
    }
    if clients_json.len() != maxclients {
        return Err(SaveError::structural(
            "clients",
            format!("expected {maxclients} clients but found {}", clients_json.len()),
        ));
    }

    let live = &ctx.game.entities;
    let entities = if live.max_entities() == maxentities && live.max_clients() == maxclients {
        live.wiped()
    } else {
        EntityTable::new(maxentities, maxclients)
    };

    let mut clients = Vec::with_capacity(maxclients);
    {
        let env = SaveEnv::new(&ctx.game.items, &entities, pointers, strict);
        let mut r = ReadCtx::new(env, &mut arena);
        for (i, json) in clients_json.iter().enumerate() {
            let mut client = GClient::default();
            r.scoped(format!("clients[{i}]"), |r| {
                read_save_struct(json, &mut client, client_desc, r)
            })?;
            clients.push(client);
        }
        warnings.extend(r.into_warnings());
    }

    Ok(StagedGame { game, clients, entities, arena, warnings })
}

fn commit_game(ctx: &mut SaveContext<'_>, mut staged: StagedGame) -> LoadReport {
    ctx.gi.free_tags(TAG_GAME);
    let released = ctx.game.arena.free_tags(MemoryTag::Game);
    log::debug!("ReadGame: released {released:?}");
    ctx.game.arena.absorb(&mut staged.arena, MemoryTag::Game);

    ctx.game.game = staged.game;
    ctx.game.clients = staged.clients;
    ctx.game.entities = staged.entities;

    ctx.game.caches.reset_all();
    precache_inventory_items(ctx.game, ctx.gi);

    if !staged.warnings.is_empty() {
        ctx.gi.dprintf(&format!("ReadGame: recovered from {} problems\n", staged.warnings.len()));
    }
    LoadReport { warnings: staged.warnings, entities: 0 }
}

// ============================================================
// WriteLevel / ReadLevel
// ============================================================

/// Records this visit's statistics in the first slot for the current map,
/// or the first free one.
fn update_level_entry(ctx: &mut GameCtx) {
    let mapname = ctx.level.mapname.clone();
    if mapname.is_empty() {
        return;
    }

    let entries = &mut ctx.game.level_entries;
    let slot = entries
        .iter()
        .position(|e| e.map_name == mapname)
        .or_else(|| entries.iter().position(|e| e.map_name.is_empty()));
    let Some(slot) = slot else {
        log::warn!("no free level entry for {}", mapname.as_str());
        return;
    };

    if entries[slot].map_name.is_empty() {
        let next = entries.iter().map(|e| e.visit_order).max().unwrap_or(0) + 1;
        entries[slot].map_name = mapname;
        entries[slot].visit_order = next;
    }

    let level = &ctx.level;
    let entry = &mut entries[slot];
    entry.pretty_name = level.level_name.clone();
    entry.total_secrets = level.total_secrets;
    entry.found_secrets = level.found_secrets;
    entry.total_monsters = level.total_monsters;
    entry.killed_monsters = level.killed_monsters;
    entry.time = level.time;
    ctx.level.entry = Some(slot);
}

fn write_entity(
    env: SaveEnv<'_>,
    desc: &'static StructDescriptor,
    index: usize,
    ent: &Edict,
) -> Result<(usize, Value, Vec<SaveWarning>), SaveError> {
    let mut w = WriteCtx::new(env);
    let value = w.scoped("entities", |w| {
        w.scoped(index.to_string(), |w| write_save_struct(ent, desc, false, w))
    })?;
    Ok((index, value.unwrap_or_else(|| Value::Object(Map::new())), w.into_warnings()))
}

pub fn write_level_document(ctx: &mut SaveContext<'_>, transition: bool) -> Result<SaveDocument, SaveError> {
    update_level_entry(ctx.game);
    write_level_fields(ctx, transition).map_err(|e| ctx.fail("WriteLevel", e))
}

fn write_level_fields(ctx: &SaveContext<'_>, transition: bool) -> Result<SaveDocument, SaveError> {
    let g: &GameCtx = &*ctx.game;
    let env = SaveEnv::new(&g.items, &g.entities, &ctx.registries.pointers, ctx.config.strict);
    let maxclients = g.maxclients();
    let level_desc = ctx.registries.schema::<LevelLocals>()?;
    let edict_desc = ctx.registries.schema::<Edict>()?;

    let mut doc = SaveDocument::new();
    doc.write_metadata();

    let mut w = WriteCtx::new(env);
    let level = w.scoped("level", |w| write_save_struct(&g.level, level_desc, false, w))?;
    doc.insert("level", level.unwrap_or_else(|| Value::Object(Map::new())));
    let mut warnings = w.into_warnings();

    // players re-enter through the client document on a transition
    let in_use: Vec<(usize, &Edict)> = g
        .entities
        .iter_in_use()
        .filter(|(i, _)| !(transition && (1..=maxclients).contains(i)))
        .collect();

    let written: Vec<(usize, Value, Vec<SaveWarning>)> = if in_use.len() > PARALLEL_SAVE_THRESHOLD {
        let mut results = in_use
            .par_iter()
            .map(|&(i, ent)| write_entity(env, edict_desc, i, ent))
            .collect::<Result<Vec<_>, _>>()?;
        results.sort_by_key(|(i, _, _)| *i);
        results
    } else {
        in_use.iter().map(|&(i, ent)| write_entity(env, edict_desc, i, ent)).collect::<Result<Vec<_>, _>>()?
    };

    let mut entities = Map::new();
    for (i, value, entity_warnings) in written {
        entities.insert(i.to_string(), value);
        warnings.extend(entity_warnings);
    }
    doc.insert("entities", Value::Object(entities));

    if !warnings.is_empty() {
        ctx.gi.dprintf(&format!("WriteLevel: {} fields could not be saved\n", warnings.len()));
    }
    log::debug!("WriteLevel: {} entities", in_use.len());
    Ok(doc)
}

/// Serializes level state and every in-use entity. On a transition the
/// player slots are left out.
pub fn write_level(ctx: &mut SaveContext<'_>, transition: bool) -> Result<String, SaveError> {
    let doc = write_level_document(ctx, transition)?;
    doc.to_json_string().map_err(|e| ctx.fail("WriteLevel", e))
}

struct StagedLevel {
    level: LevelLocals,
    entities: EntityTable,
    restored: Vec<usize>,
    arena: TagArena,
    warnings: Vec<SaveWarning>,
}

fn read_level_staged(ctx: &SaveContext<'_>, doc: &SaveDocument) -> Result<StagedLevel, SaveError> {
    ctx.check_metadata(doc, "level")?;

    let level_json = doc.get("level").ok_or_else(|| SaveError::structural("level", "missing"))?;
    if !level_json.is_object() {
        return Err(SaveError::structural("level", "expected object"));
    }
    let entities_json = doc
        .get("entities")
        .and_then(Value::as_object)
        .ok_or_else(|| SaveError::structural("entities", "expected object"))?;

    let level_desc = ctx.registries.schema::<LevelLocals>()?;
    let edict_desc = ctx.registries.schema::<Edict>()?;
    let mut entities = ctx.game.entities.wiped();
    let max_entities = entities.max_entities();

    let mut keyed: Vec<(usize, &Value)> = Vec::with_capacity(entities_json.len());
    for (key, value) in entities_json {
        // canonical decimal keys only
        let index = key
            .parse::<usize>()
            .ok()
            .filter(|i| i.to_string() == *key)
            .ok_or_else(|| SaveError::structural(format!("entities::{key}"), "entity key is not a slot number"))?;
        if index >= max_entities {
            return Err(SaveError::structural(
                format!("entities::{key}"),
                format!("entity number is outside 0..{max_entities}"),
            ));
        }
        keyed.push((index, value));
    }
    keyed.sort_by_key(|(i, _)| *i);

    let mut arena = match ctx.game.arena.limit() {
        Some(limit) => TagArena::with_limit(limit),
        None => TagArena::new(),
    };
    let mut level = LevelLocals::default();
    let mut loaded: Vec<(usize, Edict)> = Vec::with_capacity(keyed.len());
    let warnings = {
        let env = SaveEnv::new(&ctx.game.items, &entities, &ctx.registries.pointers, ctx.config.strict);
        let mut r = ReadCtx::new(env, &mut arena);
        r.scoped("level", |r| read_save_struct(level_json, &mut level, level_desc, r))?;
        for (index, json) in keyed {
            let mut ent = Edict::spawned(index);
            r.scoped("entities", |r| {
                r.scoped(index.to_string(), |r| read_save_struct(json, &mut ent, edict_desc, r))
            })?;
            loaded.push((index, ent));
        }
        r.into_warnings()
    };

    let mut restored = Vec::with_capacity(loaded.len());
    for (index, ent) in loaded {
        if entities.restore(index, ent) {
            restored.push(index);
        }
    }

    Ok(StagedLevel { level, entities, restored, arena, warnings })
}

fn commit_level(ctx: &mut SaveContext<'_>, mut staged: StagedLevel) -> LoadReport {
    let gi = ctx.gi;

    gi.free_tags(TAG_LEVEL);
    let released = ctx.game.arena.free_tags(MemoryTag::Level);
    log::debug!("ReadLevel: released {released:?}");
    ctx.game.arena.absorb(&mut staged.arena, MemoryTag::Level);

    ctx.game.level = staged.level;
    ctx.game.entities = staged.entities;

    for &index in &staged.restored {
        gi.linkentity(index as i32);
    }

    // clients reconnect on their own; bind each to its slot and rebase its
    // handles onto the new table
    let game = &mut *ctx.game;
    for i in 0..game.maxclients() {
        if let Some(ent) = game.entities.get_mut(i + 1) {
            ent.client = Some(i);
        }
        if let Some(client) = game.clients.get_mut(i) {
            client.pers.connected = false;
            client.pers.spawned = false;
            client.chase_target = client.chase_target.and_then(|id| game.entities.id(id.index()));
        }
    }

    // cross-level triggers fire relative to the restored clock
    let time = game.level.time;
    for &index in &staged.restored {
        let Some(ent) = game.entities.get_mut(index) else {
            continue;
        };
        if ent.classname_is("target_crosslevel_target") || ent.classname_is("target_crossunit_target") {
            ent.nextthink = time + GameTime::from_sec(ent.delay);
        }
    }

    game.caches.reset_all();
    precache_inventory_items(game, gi);
    load_shadow_lights(game, gi);

    if !staged.warnings.is_empty() {
        gi.dprintf(&format!("ReadLevel: recovered from {} problems\n", staged.warnings.len()));
    }
    LoadReport { warnings: staged.warnings, entities: staged.restored.len() }
}

/// Republishes every shadow light to the client config strings.
fn load_shadow_lights(ctx: &GameCtx, gi: &dyn GameImport) {
    for (i, light) in ctx.level.shadow_light_info.iter().enumerate() {
        let [dx, dy, dz] = light.conedirection;
        gi.configstring(
            CS_SHADOWLIGHTS + i as i32,
            &format!(
                "{};{};{};{};{};{};{};{};{};{} {} {}",
                light.entity_number,
                light.lighttype as u8,
                light.radius,
                light.resolution,
                light.intensity,
                light.fade_start,
                light.fade_end,
                light.lightstyle,
                light.coneangle,
                dx,
                dy,
                dz
            ),
        );
    }
}

pub fn read_level_document(ctx: &mut SaveContext<'_>, doc: &SaveDocument) -> Result<LoadReport, SaveError> {
    ctx.gi.dprintf("==== ReadLevel ====\n");
    match read_level_staged(ctx, doc) {
        Ok(staged) => Ok(commit_level(ctx, staged)),
        Err(e) => Err(ctx.fail("ReadLevel", e)),
    }
}

/// Replaces level state and the entity table with the document's.
/// Nothing changes unless the whole document loads.
pub fn read_level(ctx: &mut SaveContext<'_>, text: &str) -> Result<LoadReport, SaveError> {
    let doc = SaveDocument::parse(text).map_err(|e| ctx.fail("ReadLevel", e))?;
    read_level_document(ctx, &doc)
}

// ============================================================
// CanSave
// ============================================================

/// False when saving now would capture a state the player can't resume
/// from: a dead single player, an intermission or a story sequence.
pub fn can_save(ctx: &SaveContext<'_>) -> bool {
    let game: &GameCtx = &*ctx.game;
    if game.maxclients() == 1 && game.entities.get(1).is_some_and(|e| e.health <= 0) {
        ctx.gi.centerprintf(1, "$g_no_save_dead");
        return false;
    }
    if !game.level.intermission_time.is_zero() || game.level.story_active {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{door_use, soldier_die, DieTag, ThinkTag, UseTag};
    use crate::game_import::StubGameImport;
    use q2save_common::save_data::SaveData;
    use q2save_common::WarningKind;

    fn registries() -> &'static SaveRegistries {
        init_save(false).unwrap()
    }

    #[test]
    fn test_registries_know_every_schema() {
        let reg = registries();
        for name in ["GameLocals", "GClient", "LevelLocals", "Edict", "MonsterInfo", "MoveInfo", "LevelEntry"] {
            assert!(reg.schemas.get(name).is_some(), "{name}");
        }
        assert!(reg.schemas.is_finalized());
        assert!(reg.pointers.is_finalized());
    }

    #[test]
    fn test_edict_schema_flattens_entity_state() {
        let desc = Edict::save_struct();
        assert!(desc.field("s.origin").is_some());
        assert!(desc.field("use").is_some());
        assert!(desc.field("s.number").is_none());
        assert!(desc.field("inuse").is_none());
        assert!(desc.field("client").is_none());
    }

    #[test]
    fn test_default_gravity_is_omitted() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        let id = game.entities.spawn().unwrap();
        let ent = game.entities.get_mut(id.index()).unwrap();
        ent.health = 30;
        let mut ctx = SaveContext::new(&mut game, registries(), &gi);

        let doc = write_level_document(&mut ctx, false).unwrap();
        let ent = &doc.get("entities").unwrap()[id.index().to_string().as_str()];
        assert_eq!(ent["health"], 30);
        assert!(ent.get("gravity").is_none());
        assert!(ent.get("gravity_vector").is_none());
    }

    #[test]
    fn test_zero_gravity_is_written() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        let id = game.entities.spawn().unwrap();
        game.entities.get_mut(id.index()).unwrap().gravity = 0.0;
        let mut ctx = SaveContext::new(&mut game, registries(), &gi);

        let doc = write_level_document(&mut ctx, false).unwrap();
        let ent = &doc.get("entities").unwrap()[id.index().to_string().as_str()];
        assert_eq!(ent["gravity"], 0.0);
    }

    #[test]
    fn test_save_client_data_masks_flags() {
        let mut game = GameCtx::new(1, 16);
        let player = game.entities.get_mut(1).unwrap();
        player.inuse = true;
        player.health = 42;
        player.max_health = 100;
        player.flags = EntityFlags::GODMODE | EntityFlags::FLY;

        save_client_data(&mut game);
        let pers = &game.clients[0].pers;
        assert_eq!(pers.health, 42);
        assert_eq!(pers.max_health, 100);
        assert_eq!(pers.saved_flags, EntityFlags::GODMODE);
    }

    #[test]
    fn test_coop_score_carried_into_pers() {
        let mut game = GameCtx::new(1, 16);
        game.coop = true;
        game.entities.get_mut(1).unwrap().inuse = true;
        game.clients[0].resp.score = 7;
        save_client_data(&mut game);
        assert_eq!(game.clients[0].pers.score, 7);
    }

    #[test]
    fn test_update_level_entry_assigns_visit_order() {
        let mut game = GameCtx::new(1, 16);
        game.level.mapname = FixedString::from_text("base1").unwrap();
        game.level.found_secrets = 2;
        update_level_entry(&mut game);

        game.level.mapname = FixedString::from_text("base2").unwrap();
        update_level_entry(&mut game);

        // revisiting keeps the original order
        game.level.mapname = FixedString::from_text("base1").unwrap();
        game.level.found_secrets = 3;
        update_level_entry(&mut game);

        let entries = &game.game.level_entries;
        assert_eq!(entries[0].map_name.as_str(), "base1");
        assert_eq!(entries[0].visit_order, 1);
        assert_eq!(entries[0].found_secrets, 3);
        assert_eq!(entries[1].map_name.as_str(), "base2");
        assert_eq!(entries[1].visit_order, 2);
        assert_eq!(game.level.entry, Some(0));
    }

    #[test]
    fn test_autosaved_flag_only_set_while_writing() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        let mut ctx = SaveContext::new(&mut game, registries(), &gi);

        let doc = write_game_document(&mut ctx, true).unwrap();
        assert_eq!(doc.get("game").unwrap()["autosaved"], true);
        assert!(!ctx.game.game.autosaved);
    }

    #[test]
    fn test_unknown_think_recovers_in_lenient_mode() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        let id = game.entities.spawn().unwrap();
        game.entities.get_mut(id.index()).unwrap().use_fn = SaveData::<UseTag>::new(door_use);
        let mut ctx = SaveContext::new(&mut game, registries(), &gi);

        let mut doc = write_level_document(&mut ctx, false).unwrap().into_value();
        doc["entities"][id.index().to_string()]["think"] = Value::from("nonexistent_callback");
        let doc = SaveDocument::from_value(doc).unwrap();

        let report = read_level_document(&mut ctx, &doc).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::Reference);
        let ent = ctx.game.entities.get(id.index()).unwrap();
        assert_eq!(ent.think, SaveData::<ThinkTag>::none());
        assert_eq!(ent.use_fn, SaveData::<UseTag>::new(door_use));
    }

    #[test]
    fn test_unknown_think_fails_in_strict_mode() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        let id = game.entities.spawn().unwrap();
        game.entities.get_mut(id.index()).unwrap().die = SaveData::<DieTag>::new(soldier_die);
        let mut ctx = SaveContext::new(&mut game, registries(), &gi)
            .with_config(SaveConfig { strict: true, ..SaveConfig::default() });

        let mut doc = write_level_document(&mut ctx, false).unwrap().into_value();
        doc["entities"][id.index().to_string()]["think"] = Value::from("nonexistent_callback");
        let doc = SaveDocument::from_value(doc).unwrap();

        let err = read_level_document(&mut ctx, &doc).unwrap_err();
        assert!(matches!(err, SaveError::Reference { .. }));
        assert_eq!(gi.errors().len(), 1);
        // the live table is untouched
        assert_eq!(ctx.game.entities.get(id.index()).unwrap().die, SaveData::<DieTag>::new(soldier_die));
    }

    #[test]
    fn test_entity_key_out_of_range_is_fatal() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        let mut ctx = SaveContext::new(&mut game, registries(), &gi);

        let mut doc = write_level_document(&mut ctx, false).unwrap().into_value();
        doc["entities"]["99"] = serde_json::json!({});
        let doc = SaveDocument::from_value(doc).unwrap();

        let err = read_level_document(&mut ctx, &doc).unwrap_err();
        assert!(matches!(err, SaveError::Structural { .. }));
    }

    #[test]
    fn test_entity_key_must_be_canonical() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        let mut ctx = SaveContext::new(&mut game, registries(), &gi);

        let mut doc = write_level_document(&mut ctx, false).unwrap().into_value();
        doc["entities"]["3"] = serde_json::json!({"health": 10});
        doc["entities"]["03"] = serde_json::json!({"health": 20});
        let doc = SaveDocument::from_value(doc).unwrap();

        match read_level_document(&mut ctx, &doc).unwrap_err() {
            SaveError::Structural { path, .. } => assert_eq!(path, "entities::03"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(ctx.game.entities.get(3).map_or(true, |e| !e.inuse));
    }

    #[test]
    fn test_unregistered_schema_is_refused() {
        let gi = StubGameImport::new();
        let mut schemas = SchemaRegistry::new();
        schemas.register::<GameLocals>().unwrap();
        schemas.register::<GClient>().unwrap();
        schemas.finalize().unwrap();
        let mut pointers = SaveDataRegistry::new();
        register_save_data(&mut pointers).unwrap();
        pointers.finalize(false).unwrap();
        let partial = SaveRegistries { schemas, pointers };

        let mut game = GameCtx::new(1, 16);
        let mut ctx = SaveContext::new(&mut game, &partial, &gi);
        assert!(write_game(&mut ctx, false).is_ok());
        let err = write_level(&mut ctx, false).unwrap_err();
        assert!(matches!(err, SaveError::Registration(_)), "{err:?}");
        assert!(partial.schema::<Edict>().is_err());
        assert!(partial.schema::<ClientPersistant>().is_ok());
    }

    #[test]
    fn test_shadow_lights_republished() {
        let gi = StubGameImport::new();
        let mut game = GameCtx::new(1, 16);
        game.level.shadow_light_info.push(ShadowLightInfo {
            entity_number: 5,
            radius: 300.0,
            conedirection: [0.0, 0.0, -1.0],
            ..ShadowLightInfo::default()
        });
        load_shadow_lights(&game, &gi);
        assert_eq!(gi.get_configstring(CS_SHADOWLIGHTS), "5;0;300;0;0;0;0;0;0;0 0 -1");
    }
}
