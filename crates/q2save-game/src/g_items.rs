// g_items.rs — Item table and item precaching

use q2save_common::save_env::ItemCatalog;

use crate::g_local::*;
use crate::game_import::GameImport;

pub const ARMOR_NONE: i32 = 0;
pub const ARMOR_JACKET: i32 = 1;
pub const ARMOR_COMBAT: i32 = 2;
pub const ARMOR_BODY: i32 = 3;
pub const ARMOR_SHARD: i32 = 4;

pub const POWER_ARMOR_NONE: i32 = 0;
pub const POWER_ARMOR_SCREEN: i32 = 1;
pub const POWER_ARMOR_SHIELD: i32 = 2;

pub const AMMO_BULLETS: i32 = 0;
pub const AMMO_SHELLS: i32 = 1;
pub const AMMO_ROCKETS: i32 = 2;
pub const AMMO_GRENADES: i32 = 3;
pub const AMMO_CELLS: i32 = 4;
pub const AMMO_SLUGS: i32 = 5;

pub const EF_ROTATE: u32 = 0x00000001;

/// Game item definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GItem {
    pub classname: &'static str,
    pub pickup_sound: &'static str,
    pub world_model: &'static str,
    pub world_model_flags: u32,
    pub view_model: &'static str,
    pub icon: &'static str,
    pub pickup_name: &'static str,
    pub count_width: i32,
    pub quantity: i32,
    pub ammo: &'static str,
    pub flags: ItemFlags,
    pub tag: i32,
    pub precaches: &'static str,
}

impl GItem {
    pub const NULL: GItem = GItem {
        classname: "",
        pickup_sound: "",
        world_model: "",
        world_model_flags: 0,
        view_model: "",
        icon: "",
        pickup_name: "",
        count_width: 0,
        quantity: 0,
        ammo: "",
        flags: ItemFlags::empty(),
        tag: 0,
        precaches: "",
    };
}

/// The item table. Index 0 is never a valid item.
#[derive(Debug, Clone)]
pub struct ItemList {
    items: Vec<GItem>,
}

impl ItemList {
    pub fn new(items: Vec<GItem>) -> Self {
        let mut list = Vec::with_capacity(items.len() + 1);
        list.push(GItem::NULL);
        list.extend(items);
        ItemList { items: list }
    }

    pub fn standard() -> Self {
        ItemList::new(build_itemlist())
    }

    /// Number of real items.
    pub fn num_items(&self) -> usize {
        self.items.len() - 1
    }

    pub fn get(&self, item: ItemId) -> Option<&GItem> {
        if item.is_null() {
            return None;
        }
        self.items.get(item.index())
    }

    pub fn find_by_classname(&self, classname: &str) -> Option<ItemId> {
        if classname.is_empty() {
            return None;
        }
        self.items
            .iter()
            .position(|it| it.classname.eq_ignore_ascii_case(classname))
            .map(|i| ItemId(i as u16))
    }

    /// Lookup by pickup name, e.g. "Body Armor".
    pub fn find(&self, pickup_name: &str) -> Option<ItemId> {
        if pickup_name.is_empty() {
            return None;
        }
        self.items
            .iter()
            .position(|it| it.pickup_name.eq_ignore_ascii_case(pickup_name))
            .map(|i| ItemId(i as u16))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &GItem)> + '_ {
        self.items.iter().enumerate().skip(1).map(|(i, it)| (ItemId(i as u16), it))
    }
}

impl ItemCatalog for ItemList {
    fn item_count(&self) -> usize {
        self.items.len()
    }

    fn find_by_classname(&self, classname: &str) -> Option<ItemId> {
        ItemList::find_by_classname(self, classname)
    }

    fn classname(&self, item: ItemId) -> Option<&str> {
        self.get(item).map(|it| it.classname)
    }
}

// ============================================================
// PrecacheItem
// ============================================================

/// Precaches all data needed for an item, including its ammo and the
/// resources named in its precache string.
pub fn precache_item(ctx: &mut GameCtx, gi: &dyn GameImport, item: ItemId) {
    let Some(&it) = ctx.items.get(item) else {
        return;
    };

    if !it.pickup_sound.is_empty() {
        ctx.caches.sound(gi, it.pickup_sound);
    }
    if !it.world_model.is_empty() {
        ctx.caches.model(gi, it.world_model);
    }
    if !it.view_model.is_empty() {
        ctx.caches.model(gi, it.view_model);
    }
    if !it.icon.is_empty() {
        ctx.caches.image(gi, it.icon);
    }

    // parse everything for its ammo
    if !it.ammo.is_empty() {
        if let Some(ammo) = ctx.items.find(it.ammo) {
            if ammo != item {
                precache_item(ctx, gi, ammo);
            }
        }
    }

    // parse the space separated precache string for other items
    for token in it.precaches.split_whitespace() {
        if token.len() >= MAX_QPATH || token.len() < 5 {
            gi.dprintf(&format!("PrecacheItem: {} has bad precache string\n", it.classname));
            return;
        }
        if token.ends_with("md2") || token.ends_with("sp2") {
            ctx.caches.model(gi, token);
        } else if token.ends_with("wav") {
            ctx.caches.sound(gi, token);
        } else if token.ends_with("pcx") {
            ctx.caches.image(gi, token);
        }
    }
}

/// Precaches everything any client is carrying. Deathmatch precaches the
/// whole item list up front, so there is nothing to do there.
pub fn precache_inventory_items(ctx: &mut GameCtx, gi: &dyn GameImport) {
    if ctx.deathmatch {
        return;
    }

    let mut held: Vec<ItemId> = Vec::new();
    for client in &ctx.clients {
        held.extend(client.pers.inventory.iter().map(|(item, _)| item));
        held.extend(client.pers.weapon);
    }
    held.sort_unstable();
    held.dedup();

    for item in held {
        precache_item(ctx, gi, item);
    }
}

// ============================================================
// Item table (itemlist[])
// ============================================================

/// Builds the item table. Index 0 is added by `ItemList::new`.
pub fn build_itemlist() -> Vec<GItem> {
    vec![
        // ============================================================
        // ARMOR
        // ============================================================

        // 1: item_armor_body
        GItem {
            classname: "item_armor_body",
            pickup_sound: "misc/ar1_pkup.wav",
            world_model: "models/items/armor/body/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "i_bodyarmor",
            pickup_name: "Body Armor",
            count_width: 3,
            flags: ItemFlags::ARMOR,
            tag: ARMOR_BODY,
            ..GItem::NULL
        },
        // 2: item_armor_combat
        GItem {
            classname: "item_armor_combat",
            pickup_sound: "misc/ar1_pkup.wav",
            world_model: "models/items/armor/combat/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "i_combatarmor",
            pickup_name: "Combat Armor",
            count_width: 3,
            flags: ItemFlags::ARMOR,
            tag: ARMOR_COMBAT,
            ..GItem::NULL
        },
        // 3: item_armor_jacket
        GItem {
            classname: "item_armor_jacket",
            pickup_sound: "misc/ar1_pkup.wav",
            world_model: "models/items/armor/jacket/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "i_jacketarmor",
            pickup_name: "Jacket Armor",
            count_width: 3,
            flags: ItemFlags::ARMOR,
            tag: ARMOR_JACKET,
            ..GItem::NULL
        },
        // 4: item_armor_shard
        GItem {
            classname: "item_armor_shard",
            pickup_sound: "misc/ar2_pkup.wav",
            world_model: "models/items/armor/shard/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "i_jacketarmor",
            pickup_name: "Armor Shard",
            count_width: 3,
            flags: ItemFlags::ARMOR,
            tag: ARMOR_SHARD,
            ..GItem::NULL
        },
        // 5: item_power_screen
        GItem {
            classname: "item_power_screen",
            pickup_sound: "misc/ar3_pkup.wav",
            world_model: "models/items/armor/screen/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "i_powerscreen",
            pickup_name: "Power Screen",
            quantity: 60,
            flags: ItemFlags::ARMOR,
            tag: POWER_ARMOR_SCREEN,
            ..GItem::NULL
        },
        // 6: item_power_shield
        GItem {
            classname: "item_power_shield",
            pickup_sound: "misc/ar3_pkup.wav",
            world_model: "models/items/armor/shield/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "i_powershield",
            pickup_name: "Power Shield",
            quantity: 60,
            flags: ItemFlags::ARMOR,
            tag: POWER_ARMOR_SHIELD,
            precaches: "misc/power2.wav misc/power1.wav",
            ..GItem::NULL
        },

        // ============================================================
        // WEAPONS
        // ============================================================

        // 7: weapon_blaster
        GItem {
            classname: "weapon_blaster",
            view_model: "models/weapons/v_blast/tris.md2",
            icon: "w_blaster",
            pickup_name: "Blaster",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "weapons/blastf1a.wav misc/lasfly.wav",
            ..GItem::NULL
        },
        // 8: weapon_shotgun
        GItem {
            classname: "weapon_shotgun",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_shotg/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_shotg/tris.md2",
            icon: "w_shotgun",
            pickup_name: "Shotgun",
            quantity: 1,
            ammo: "Shells",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "weapons/shotgf1b.wav weapons/shotgr1b.wav",
            ..GItem::NULL
        },
        // 9: weapon_supershotgun
        GItem {
            classname: "weapon_supershotgun",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_shotg2/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_shotg2/tris.md2",
            icon: "w_sshotgun",
            pickup_name: "Super Shotgun",
            quantity: 2,
            ammo: "Shells",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "weapons/sshotf1b.wav",
            ..GItem::NULL
        },
        // 10: weapon_machinegun
        GItem {
            classname: "weapon_machinegun",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_machn/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_machn/tris.md2",
            icon: "w_machinegun",
            pickup_name: "Machinegun",
            quantity: 1,
            ammo: "Bullets",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "weapons/machgf1b.wav weapons/machgf2b.wav weapons/machgf3b.wav weapons/machgf4b.wav weapons/machgf5b.wav",
            ..GItem::NULL
        },
        // 11: weapon_chaingun
        GItem {
            classname: "weapon_chaingun",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_chain/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_chain/tris.md2",
            icon: "w_chaingun",
            pickup_name: "Chaingun",
            quantity: 1,
            ammo: "Bullets",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "weapons/chngnu1a.wav weapons/chngnl1a.wav weapons/machgf3b.wav weapons/chngnd1a.wav",
            ..GItem::NULL
        },
        // 12: ammo_grenades
        GItem {
            classname: "ammo_grenades",
            pickup_sound: "misc/am_pkup.wav",
            world_model: "models/items/ammo/grenades/medium/tris.md2",
            view_model: "models/weapons/v_handgr/tris.md2",
            icon: "a_grenades",
            pickup_name: "Grenades",
            count_width: 3,
            quantity: 5,
            ammo: "grenades",
            flags: ItemFlags::AMMO.union(ItemFlags::WEAPON),
            tag: AMMO_GRENADES,
            precaches: "weapons/hgrent1a.wav weapons/hgrena1b.wav weapons/hgrenc1b.wav weapons/hgrenb1a.wav weapons/hgrenb2a.wav",
            ..GItem::NULL
        },
        // 13: weapon_grenadelauncher
        GItem {
            classname: "weapon_grenadelauncher",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_launch/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_launch/tris.md2",
            icon: "w_glauncher",
            pickup_name: "Grenade Launcher",
            quantity: 1,
            ammo: "Grenades",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "models/objects/grenade/tris.md2 weapons/grenlf1a.wav weapons/grenlr1b.wav weapons/grenlb1b.wav",
            ..GItem::NULL
        },
        // 14: weapon_rocketlauncher
        GItem {
            classname: "weapon_rocketlauncher",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_rocket/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_rocket/tris.md2",
            icon: "w_rlauncher",
            pickup_name: "Rocket Launcher",
            quantity: 1,
            ammo: "Rockets",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "models/objects/rocket/tris.md2 weapons/rockfly.wav weapons/rocklf1a.wav weapons/rocklr1b.wav models/objects/debris2/tris.md2",
            ..GItem::NULL
        },
        // 15: weapon_hyperblaster
        GItem {
            classname: "weapon_hyperblaster",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_hyperb/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_hyperb/tris.md2",
            icon: "w_hyperblaster",
            pickup_name: "HyperBlaster",
            quantity: 1,
            ammo: "Cells",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "weapons/hyprbu1a.wav weapons/hyprbl1a.wav weapons/hyprbf1a.wav weapons/hyprbd1a.wav misc/lasfly.wav",
            ..GItem::NULL
        },
        // 16: weapon_railgun
        GItem {
            classname: "weapon_railgun",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_rail/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_rail/tris.md2",
            icon: "w_railgun",
            pickup_name: "Railgun",
            quantity: 1,
            ammo: "Slugs",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "weapons/rg_hum.wav",
            ..GItem::NULL
        },
        // 17: weapon_bfg
        GItem {
            classname: "weapon_bfg",
            pickup_sound: "misc/w_pkup.wav",
            world_model: "models/weapons/g_bfg/tris.md2",
            world_model_flags: EF_ROTATE,
            view_model: "models/weapons/v_bfg/tris.md2",
            icon: "w_bfg",
            pickup_name: "BFG10K",
            quantity: 50,
            ammo: "Cells",
            flags: ItemFlags::WEAPON.union(ItemFlags::STAY_COOP),
            precaches: "sprites/s_bfg1.sp2 sprites/s_bfg2.sp2 sprites/s_bfg3.sp2 weapons/bfg__f1y.wav weapons/bfg__l1a.wav weapons/bfg__x1b.wav weapons/bfg_hum.wav",
            ..GItem::NULL
        },

        // ============================================================
        // AMMO ITEMS
        // ============================================================

        // 18: ammo_shells
        GItem {
            classname: "ammo_shells",
            pickup_sound: "misc/am_pkup.wav",
            world_model: "models/items/ammo/shells/medium/tris.md2",
            icon: "a_shells",
            pickup_name: "Shells",
            count_width: 3,
            quantity: 10,
            flags: ItemFlags::AMMO,
            tag: AMMO_SHELLS,
            ..GItem::NULL
        },
        // 19: ammo_bullets
        GItem {
            classname: "ammo_bullets",
            pickup_sound: "misc/am_pkup.wav",
            world_model: "models/items/ammo/bullets/medium/tris.md2",
            icon: "a_bullets",
            pickup_name: "Bullets",
            count_width: 3,
            quantity: 50,
            flags: ItemFlags::AMMO,
            tag: AMMO_BULLETS,
            ..GItem::NULL
        },
        // 20: ammo_cells
        GItem {
            classname: "ammo_cells",
            pickup_sound: "misc/am_pkup.wav",
            world_model: "models/items/ammo/cells/medium/tris.md2",
            icon: "a_cells",
            pickup_name: "Cells",
            count_width: 3,
            quantity: 50,
            flags: ItemFlags::AMMO,
            tag: AMMO_CELLS,
            ..GItem::NULL
        },
        // 21: ammo_rockets
        GItem {
            classname: "ammo_rockets",
            pickup_sound: "misc/am_pkup.wav",
            world_model: "models/items/ammo/rockets/medium/tris.md2",
            icon: "a_rockets",
            pickup_name: "Rockets",
            count_width: 3,
            quantity: 5,
            flags: ItemFlags::AMMO,
            tag: AMMO_ROCKETS,
            ..GItem::NULL
        },
        // 22: ammo_slugs
        GItem {
            classname: "ammo_slugs",
            pickup_sound: "misc/am_pkup.wav",
            world_model: "models/items/ammo/slugs/medium/tris.md2",
            icon: "a_slugs",
            pickup_name: "Slugs",
            count_width: 3,
            quantity: 10,
            flags: ItemFlags::AMMO,
            tag: AMMO_SLUGS,
            ..GItem::NULL
        },

        // ============================================================
        // POWERUP ITEMS
        // ============================================================

        // 23: item_quad
        GItem {
            classname: "item_quad",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/quaddama/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "p_quad",
            pickup_name: "Quad Damage",
            quantity: 60,
            flags: ItemFlags::POWERUP,
            precaches: "items/damage.wav items/damage2.wav items/damage3.wav",
            ..GItem::NULL
        },
        // 24: item_invulnerability
        GItem {
            classname: "item_invulnerability",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/invulner/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "p_invulnerability",
            pickup_name: "Invulnerability",
            quantity: 300,
            flags: ItemFlags::POWERUP,
            precaches: "items/protect.wav items/protect2.wav items/protect4.wav",
            ..GItem::NULL
        },
        // 25: item_breather
        GItem {
            classname: "item_breather",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/breather/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "p_rebreather",
            pickup_name: "Rebreather",
            quantity: 60,
            flags: ItemFlags::STAY_COOP.union(ItemFlags::POWERUP),
            precaches: "items/airout.wav",
            ..GItem::NULL
        },
        // 26: item_adrenaline
        GItem {
            classname: "item_adrenaline",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/adrenal/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "p_adrenaline",
            pickup_name: "Adrenaline",
            quantity: 60,
            ..GItem::NULL
        },

        // ============================================================
        // KEYS
        // ============================================================

        // 27: key_data_cd
        GItem {
            classname: "key_data_cd",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/keys/data_cd/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "k_datacd",
            pickup_name: "Data CD",
            count_width: 2,
            flags: ItemFlags::STAY_COOP.union(ItemFlags::KEY),
            ..GItem::NULL
        },
        // 28: key_power_cube
        GItem {
            classname: "key_power_cube",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/keys/power/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "k_powercube",
            pickup_name: "Power Cube",
            count_width: 2,
            flags: ItemFlags::STAY_COOP.union(ItemFlags::KEY),
            ..GItem::NULL
        },
        // 29: key_blue_key
        GItem {
            classname: "key_blue_key",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/keys/key/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "k_bluekey",
            pickup_name: "Blue Key",
            count_width: 2,
            flags: ItemFlags::STAY_COOP.union(ItemFlags::KEY),
            ..GItem::NULL
        },
        // 30: key_red_key
        GItem {
            classname: "key_red_key",
            pickup_sound: "items/pkup.wav",
            world_model: "models/items/keys/red_key/tris.md2",
            world_model_flags: EF_ROTATE,
            icon: "k_redkey",
            pickup_name: "Red Key",
            count_width: 2,
            flags: ItemFlags::STAY_COOP.union(ItemFlags::KEY),
            ..GItem::NULL
        },

        // ============================================================
        // HEALTH
        // ============================================================

        // 31: item_health
        GItem {
            classname: "item_health",
            pickup_sound: "items/pkup.wav",
            icon: "i_health",
            pickup_name: "Health",
            count_width: 3,
            precaches: "items/s_health.wav items/n_health.wav items/l_health.wav items/m_health.wav",
            ..GItem::NULL
        },
    ]
}
