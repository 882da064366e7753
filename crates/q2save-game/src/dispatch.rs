// dispatch.rs — Callback dispatch system for entity and monster callbacks
//
// Entity callbacks are plain function pointers held in `SaveData` slots.
// Every function that may end up in a persisted slot is registered here
// under a stable name, and saves carry that name instead of an address.
// Functions registered under the same tag must have distinct bodies, or the
// optimizer may fold them into one address.

use q2save_common::save_data::{SaveDataRegistry, SaveDataTag};
use q2save_common::save_error::SaveError;
use q2save_common::save_tag;

use crate::g_local::*;

// ============================================================
// Type aliases for callback signatures
// ============================================================

pub type ThinkFn = fn(self_idx: usize, ctx: &mut GameCtx);
pub type TouchFn = fn(self_idx: usize, other_idx: usize, ctx: &mut GameCtx);
pub type UseFn = fn(self_idx: usize, other_idx: Option<usize>, activator_idx: Option<usize>, ctx: &mut GameCtx);
pub type PainFn = fn(self_idx: usize, other_idx: Option<usize>, kick: f32, damage: i32, ctx: &mut GameCtx);
pub type DieFn = fn(
    self_idx: usize,
    inflictor_idx: Option<usize>,
    attacker_idx: Option<usize>,
    damage: i32,
    point: Vec3,
    ctx: &mut GameCtx,
);
pub type BlockedFn = fn(self_idx: usize, other_idx: usize, ctx: &mut GameCtx);
pub type MoveEndFn = fn(self_idx: usize, ctx: &mut GameCtx);
pub type MonsterThinkFn = fn(self_idx: usize, ctx: &mut GameCtx);
pub type CheckAttackFn = fn(self_idx: usize, ctx: &mut GameCtx) -> bool;

// ============================================================
// Save data tags
// ============================================================

save_tag!(pub ThinkTag: fn ThinkFn = SaveDataTag(1), "think");
save_tag!(pub TouchTag: fn TouchFn = SaveDataTag(2), "touch");
save_tag!(pub UseTag: fn UseFn = SaveDataTag(3), "use");
save_tag!(pub PainTag: fn PainFn = SaveDataTag(4), "pain");
save_tag!(pub DieTag: fn DieFn = SaveDataTag(5), "die");
save_tag!(pub BlockedTag: fn BlockedFn = SaveDataTag(6), "blocked");
save_tag!(pub MoveEndTag: fn MoveEndFn = SaveDataTag(7), "moveinfo_endfunc");
save_tag!(pub MonsterThinkTag: fn MonsterThinkFn = SaveDataTag(8), "monsterinfo_think");
save_tag!(pub CheckAttackTag: fn CheckAttackFn = SaveDataTag(9), "monsterinfo_checkattack");
save_tag!(pub MMoveTag: data &'static MMove = SaveDataTag(10), "mmove");

// Server flags
pub const SFL_CROSS_TRIGGER_MASK: u32 = 0x000000FF;

// ============================================================
// Shared helpers
// ============================================================

/// Fires the `use` callback of every entity targeted by `self_idx`.
pub fn use_targets(self_idx: usize, activator_idx: Option<usize>, ctx: &mut GameCtx) {
    let Some(target) = ctx.entities.get(self_idx).and_then(|e| e.target.as_str()).map(str::to_string) else {
        return;
    };
    let targets: Vec<(usize, UseFn)> = ctx
        .entities
        .iter_in_use()
        .filter(|(i, e)| *i != self_idx && e.targetname.eq_str(&target))
        .filter_map(|(i, e)| e.use_fn.get().map(|f| (i, f)))
        .collect();
    for (i, f) in targets {
        f(i, Some(self_idx), activator_idx, ctx);
    }
}

// ============================================================
// Think callbacks
// ============================================================

pub fn g_free_edict(self_idx: usize, ctx: &mut GameCtx) {
    ctx.entities.free(self_idx);
}

fn crosslevel_think(self_idx: usize, ctx: &mut GameCtx, flags: u32) {
    let Some(spawnflags) = ctx.entities.get(self_idx).map(|e| e.spawnflags) else {
        return;
    };
    if spawnflags == (flags & SFL_CROSS_TRIGGER_MASK & spawnflags) {
        use_targets(self_idx, Some(self_idx), ctx);
        ctx.entities.free(self_idx);
    }
}

pub fn target_crosslevel_target_think(self_idx: usize, ctx: &mut GameCtx) {
    let flags = ctx.game.cross_level_flags;
    crosslevel_think(self_idx, ctx, flags);
}

pub fn target_crossunit_target_think(self_idx: usize, ctx: &mut GameCtx) {
    let flags = ctx.game.cross_unit_flags;
    crosslevel_think(self_idx, ctx, flags);
}

/// Advances the current monster move one frame (M_MoveFrame).
pub fn monster_think(self_idx: usize, ctx: &mut GameCtx) {
    let time = ctx.level.time;
    let Some(ent) = ctx.entities.get_mut(self_idx) else {
        return;
    };
    ent.nextthink = time + FRAMETIME;

    if let Some(next) = ent.monsterinfo.next_move.get() {
        ent.monsterinfo.active_move.set(Some(next));
        ent.monsterinfo.next_move.set(None);
    }
    let Some(mv) = ent.monsterinfo.active_move.get() else {
        return;
    };

    let mut end = None;
    let frame = if ent.s.frame < mv.firstframe || ent.s.frame > mv.lastframe {
        mv.firstframe
    } else if ent.s.frame == mv.lastframe {
        end = mv.endfunc;
        mv.firstframe
    } else {
        ent.s.frame + 1
    };
    ent.s.frame = frame;
    let scale = if ent.monsterinfo.scale == 0.0 { 1.0 } else { ent.monsterinfo.scale };

    if let Some(endfunc) = end {
        endfunc(self_idx, ctx);
        let still_active = ctx
            .entities
            .get(self_idx)
            .and_then(|e| e.monsterinfo.active_move.get())
            .is_some_and(|m| std::ptr::eq(m, mv));
        if !still_active {
            return;
        }
    }

    if let Some(f) = mv.frame(frame).copied() {
        if let Some(ai) = f.ai_fn {
            ai(self_idx, ctx, f.dist * scale);
        }
        if let Some(think) = f.think_fn {
            think(self_idx, ctx);
        }
    }
}

pub fn barrel_explode(self_idx: usize, ctx: &mut GameCtx) {
    ctx.level.sound_entity = ctx.entities.id(self_idx);
    ctx.level.sound_entity_framenum = ctx.level.framenum;
    ctx.entities.free(self_idx);
}

// ============================================================
// Touch callbacks
// ============================================================

pub fn touch_item(self_idx: usize, other_idx: usize, ctx: &mut GameCtx) {
    let Some(item) = ctx.entities.get(self_idx).and_then(|e| e.item) else {
        return;
    };
    let Some(client) = ctx.entities.get(other_idx).and_then(|e| e.client) else {
        return;
    };
    let quantity = ctx.items.get(item).map_or(1, |it| it.quantity.max(1));
    if let Some(cl) = ctx.clients.get_mut(client) {
        cl.pers.inventory.add(item, quantity);
        if let Some(e) = ctx.entities.get_mut(self_idx) {
            e.item_picked_up_by.set(client, true);
        }
        ctx.entities.free(self_idx);
    }
}

pub fn trigger_push_touch(self_idx: usize, other_idx: usize, ctx: &mut GameCtx) {
    let Some((movedir, speed)) = ctx.entities.get(self_idx).map(|e| (e.movedir, e.speed)) else {
        return;
    };
    if let Some(other) = ctx.entities.get_mut(other_idx) {
        for (v, d) in other.velocity.iter_mut().zip(movedir) {
            *v = d * speed * 10.0;
        }
    }
}

// ============================================================
// Use callbacks
// ============================================================

pub fn use_target_secret(self_idx: usize, _other_idx: Option<usize>, activator_idx: Option<usize>, ctx: &mut GameCtx) {
    ctx.level.found_secrets += 1;
    use_targets(self_idx, activator_idx, ctx);
    ctx.entities.free(self_idx);
}

pub fn door_use(self_idx: usize, _other_idx: Option<usize>, activator_idx: Option<usize>, ctx: &mut GameCtx) {
    let activator = activator_idx.and_then(|i| ctx.entities.id(i));
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        if ent.moveinfo.state == MoveState::Bottom || ent.moveinfo.state == MoveState::Down {
            ent.moveinfo.state = MoveState::Up;
            ent.activator = activator;
        }
    }
}

// ============================================================
// Pain callbacks
// ============================================================

pub fn soldier_pain(self_idx: usize, _other_idx: Option<usize>, _kick: f32, _damage: i32, ctx: &mut GameCtx) {
    let time = ctx.level.time;
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        if ent.health < ent.max_health / 2 {
            ent.s.skinnum |= 1;
        }
        if time < ent.pain_debounce_time {
            return;
        }
        ent.pain_debounce_time = time + GameTime::from_sec(3.0);
    }
}

pub fn gunner_pain(self_idx: usize, _other_idx: Option<usize>, _kick: f32, damage: i32, ctx: &mut GameCtx) {
    let time = ctx.level.time;
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        if ent.health < ent.max_health / 2 {
            ent.s.skinnum = 1;
        }
        if time < ent.pain_debounce_time || damage <= 10 {
            return;
        }
        ent.pain_debounce_time = time + GameTime::from_ms(3500);
    }
}

// ============================================================
// Die callbacks
// ============================================================

pub fn soldier_die(
    self_idx: usize,
    _inflictor_idx: Option<usize>,
    _attacker_idx: Option<usize>,
    _damage: i32,
    _point: Vec3,
    ctx: &mut GameCtx,
) {
    let Some(ent) = ctx.entities.get_mut(self_idx) else {
        return;
    };
    if ent.deadflag == DeadFlag::Dead {
        return;
    }
    ent.deadflag = DeadFlag::Dead;
    ent.takedamage = Damage::Yes;
    ent.svflags |= SvFlags::DEADMONSTER;
    ctx.level.killed_monsters += 1;
}

pub fn barrel_die(
    self_idx: usize,
    _inflictor_idx: Option<usize>,
    attacker_idx: Option<usize>,
    _damage: i32,
    _point: Vec3,
    ctx: &mut GameCtx,
) {
    let time = ctx.level.time;
    let attacker = attacker_idx.and_then(|i| ctx.entities.id(i));
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        ent.takedamage = Damage::No;
        ent.activator = attacker;
        ent.nextthink = time + FRAMETIME;
        ent.think.set(Some(barrel_explode));
    }
}

// ============================================================
// Blocked callbacks
// ============================================================

pub fn door_blocked(self_idx: usize, other_idx: usize, ctx: &mut GameCtx) {
    let is_client = ctx.entities.get(other_idx).is_some_and(|e| e.client.is_some());
    if !is_client {
        // give it a chance to go away on its own terms
        ctx.entities.free(other_idx);
        return;
    }
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        ent.moveinfo.state = match ent.moveinfo.state {
            MoveState::Down => MoveState::Up,
            MoveState::Up => MoveState::Down,
            other => other,
        };
    }
}

// ============================================================
// Mover end callbacks
// ============================================================

pub fn door_hit_top(self_idx: usize, ctx: &mut GameCtx) {
    let time = ctx.level.time;
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        ent.moveinfo.state = MoveState::Top;
        if ent.moveinfo.wait >= 0.0 {
            ent.nextthink = time + GameTime::from_sec(ent.moveinfo.wait);
        }
    }
}

pub fn door_hit_bottom(self_idx: usize, ctx: &mut GameCtx) {
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        ent.moveinfo.state = MoveState::Bottom;
        ent.s.sound = 0;
    }
}

// ============================================================
// Monster AI
// ============================================================

fn ai_stand(self_idx: usize, ctx: &mut GameCtx, _dist: f32) {
    let has_enemy = ctx.entities.get(self_idx).is_some_and(|e| e.enemy.is_some());
    if has_enemy {
        if let Some(run) = ctx.entities.get(self_idx).and_then(|e| e.monsterinfo.run.get()) {
            run(self_idx, ctx);
        }
    }
}

fn ai_move(self_idx: usize, ctx: &mut GameCtx, dist: f32) {
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        let yaw = ent.s.angles[1].to_radians();
        ent.s.origin[0] += yaw.cos() * dist;
        ent.s.origin[1] += yaw.sin() * dist;
    }
}

fn ai_charge(self_idx: usize, ctx: &mut GameCtx, _dist: f32) {
    let Some(enemy) = ctx.entities.get(self_idx).and_then(|e| e.enemy) else {
        return;
    };
    let Some(target) = ctx.entities.resolve(enemy).map(|e| e.s.origin) else {
        return;
    };
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        let dx = target[0] - ent.s.origin[0];
        let dy = target[1] - ent.s.origin[1];
        ent.ideal_yaw = dy.atan2(dx).to_degrees();
    }
}

pub fn soldier_stand(self_idx: usize, ctx: &mut GameCtx) {
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        ent.monsterinfo.active_move.set(Some(&SOLDIER_MOVE_STAND));
    }
}

pub fn soldier_walk(self_idx: usize, ctx: &mut GameCtx) {
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        ent.monsterinfo.active_move.set(Some(&SOLDIER_MOVE_WALK));
    }
}

pub fn soldier_run(self_idx: usize, ctx: &mut GameCtx) {
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        if ent.monsterinfo.aiflags.contains(AiFlags::STAND_GROUND) {
            ent.monsterinfo.active_move.set(Some(&SOLDIER_MOVE_STAND));
        } else {
            ent.monsterinfo.active_move.set(Some(&SOLDIER_MOVE_RUN));
        }
    }
}

pub fn soldier_attack(self_idx: usize, ctx: &mut GameCtx) {
    let time = ctx.level.time;
    if let Some(ent) = ctx.entities.get_mut(self_idx) {
        ent.monsterinfo.attack_finished = time + GameTime::from_ms(1200);
        ent.monsterinfo.active_move.set(Some(&SOLDIER_MOVE_RUN));
    }
}

pub fn m_check_attack(self_idx: usize, ctx: &mut GameCtx) -> bool {
    let time = ctx.level.time;
    let Some(ent) = ctx.entities.get_mut(self_idx) else {
        return false;
    };
    if ent.enemy.is_none() || time < ent.monsterinfo.attack_finished {
        return false;
    }
    ent.monsterinfo.attack_state = AttackState::Missile;
    true
}

// ============================================================
// Monster move tables
// ============================================================

static SOLDIER_FRAMES_STAND: [MFrame; 4] = [
    MFrame { ai_fn: Some(ai_stand), dist: 0.0, think_fn: None },
    MFrame { ai_fn: Some(ai_stand), dist: 0.0, think_fn: None },
    MFrame { ai_fn: Some(ai_stand), dist: 0.0, think_fn: None },
    MFrame { ai_fn: Some(ai_stand), dist: 0.0, think_fn: None },
];

pub static SOLDIER_MOVE_STAND: MMove = MMove {
    firstframe: 0,
    lastframe: 3,
    frames: &SOLDIER_FRAMES_STAND,
    endfunc: Some(soldier_stand),
};

static SOLDIER_FRAMES_WALK: [MFrame; 4] = [
    MFrame { ai_fn: Some(ai_move), dist: 3.0, think_fn: None },
    MFrame { ai_fn: Some(ai_move), dist: 6.0, think_fn: None },
    MFrame { ai_fn: Some(ai_move), dist: 2.0, think_fn: None },
    MFrame { ai_fn: Some(ai_move), dist: 2.0, think_fn: None },
];

pub static SOLDIER_MOVE_WALK: MMove = MMove {
    firstframe: 4,
    lastframe: 7,
    frames: &SOLDIER_FRAMES_WALK,
    endfunc: None,
};

static SOLDIER_FRAMES_RUN: [MFrame; 2] = [
    MFrame { ai_fn: Some(ai_move), dist: 10.0, think_fn: None },
    MFrame { ai_fn: Some(ai_charge), dist: 11.0, think_fn: None },
];

pub static SOLDIER_MOVE_RUN: MMove = MMove {
    firstframe: 8,
    lastframe: 9,
    frames: &SOLDIER_FRAMES_RUN,
    endfunc: Some(soldier_run),
};

// ============================================================
// Registration
// ============================================================

/// Registers every persisted function and data pointer.
pub fn register_save_data(reg: &mut SaveDataRegistry) -> Result<(), SaveError> {
    reg.register_list::<ThinkTag>(&[
        ("G_FreeEdict", g_free_edict as ThinkFn),
        ("target_crosslevel_target_think", target_crosslevel_target_think as ThinkFn),
        ("target_crossunit_target_think", target_crossunit_target_think as ThinkFn),
        ("monster_think", monster_think as ThinkFn),
        ("barrel_explode", barrel_explode as ThinkFn),
    ])?;
    reg.register_list::<TouchTag>(&[
        ("Touch_Item", touch_item as TouchFn),
        ("trigger_push_touch", trigger_push_touch as TouchFn),
    ])?;
    reg.register_list::<UseTag>(&[
        ("use_target_secret", use_target_secret as UseFn),
        ("door_use", door_use as UseFn),
    ])?;
    reg.register_list::<PainTag>(&[
        ("soldier_pain", soldier_pain as PainFn),
        ("gunner_pain", gunner_pain as PainFn),
    ])?;
    reg.register_list::<DieTag>(&[
        ("soldier_die", soldier_die as DieFn),
        ("barrel_delay", barrel_die as DieFn),
    ])?;
    reg.register::<BlockedTag>("door_blocked", door_blocked)?;
    reg.register_list::<MoveEndTag>(&[
        ("door_hit_top", door_hit_top as MoveEndFn),
        ("door_hit_bottom", door_hit_bottom as MoveEndFn),
    ])?;
    reg.register_list::<MonsterThinkTag>(&[
        ("soldier_stand", soldier_stand as MonsterThinkFn),
        ("soldier_walk", soldier_walk as MonsterThinkFn),
        ("soldier_run", soldier_run as MonsterThinkFn),
        ("soldier_attack", soldier_attack as MonsterThinkFn),
    ])?;
    reg.register::<CheckAttackTag>("M_CheckAttack", m_check_attack)?;
    reg.register_list::<MMoveTag>(&[
        ("soldier_move_stand", &SOLDIER_MOVE_STAND),
        ("soldier_move_walk", &SOLDIER_MOVE_WALK),
        ("soldier_move_run", &SOLDIER_MOVE_RUN),
    ])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use q2save_common::save_data::{SaveData, SaveTag};

    fn registry() -> SaveDataRegistry {
        let mut reg = SaveDataRegistry::new();
        register_save_data(&mut reg).unwrap();
        reg
    }

    #[test]
    fn test_registry_is_consistent() {
        let mut reg = registry();
        assert!(reg.finalize(true).unwrap().is_empty());
        assert_eq!(reg.name_of::<ThinkTag>(monster_think), Some("monster_think"));
        assert_eq!(reg.name_of::<MMoveTag>(&SOLDIER_MOVE_RUN), Some("soldier_move_run"));
        assert!(reg.find::<DieTag>("barrel_delay").is_some());
        assert_eq!(reg.list_name(CheckAttackTag::TAG), "monsterinfo_checkattack");
    }

    #[test]
    fn test_registration_after_finalize_fails() {
        let mut reg = registry();
        reg.finalize(false).unwrap();
        assert!(register_save_data(&mut reg).is_err());
    }

    #[test]
    fn test_monster_think_cycles_frames() {
        let mut ctx = GameCtx::new(1, 16);
        let id = ctx.entities.spawn().unwrap();
        let idx = id.index();
        {
            let ent = ctx.entities.get_mut(idx).unwrap();
            ent.monsterinfo.active_move = SaveData::new(&SOLDIER_MOVE_WALK);
        }
        monster_think(idx, &mut ctx);
        assert_eq!(ctx.entities.get(idx).unwrap().s.frame, 4);
        monster_think(idx, &mut ctx);
        assert_eq!(ctx.entities.get(idx).unwrap().s.frame, 5);
        assert!(ctx.entities.get(idx).unwrap().s.origin[0] > 0.0);
        assert_eq!(ctx.entities.get(idx).unwrap().nextthink, FRAMETIME);
    }

    #[test]
    fn test_crosslevel_target_fires_when_flags_match() {
        let mut ctx = GameCtx::new(1, 16);
        let trigger = ctx.entities.spawn().unwrap().index();
        let secret = ctx.entities.spawn().unwrap().index();
        {
            let t = ctx.entities.get_mut(trigger).unwrap();
            t.spawnflags = 0x3;
            t.target = LevelString::from("t1");
        }
        {
            let s = ctx.entities.get_mut(secret).unwrap();
            s.targetname = LevelString::from("t1");
            s.use_fn.set(Some(use_target_secret));
        }

        ctx.game.cross_level_flags = 0x1;
        target_crosslevel_target_think(trigger, &mut ctx);
        assert!(ctx.entities.get(trigger).unwrap().inuse);
        assert_eq!(ctx.level.found_secrets, 0);

        ctx.game.cross_level_flags = 0x7;
        target_crosslevel_target_think(trigger, &mut ctx);
        assert!(!ctx.entities.get(trigger).unwrap().inuse);
        assert!(!ctx.entities.get(secret).unwrap().inuse);
        assert_eq!(ctx.level.found_secrets, 1);
    }
}
