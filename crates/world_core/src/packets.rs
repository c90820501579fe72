//! Server → client packet builders.
//!
//! Only the packets produced by the world core live here. Positions are sent
//! as little-endian `f32`, identifiers and counters through
//! [`PacketBuilder::put_int`] with the byte order noted per field.

use crate::entity::{Ai, AiStatus, CharacterStatus, DroppedItem, HousingItem, NpcPosition, Pet, PetStatus, WarStoneSnapshot};
use crate::types::{Coordinate, EntityId, PseudoId};
use crate::utils::level_color;
use crate::wire::PacketBuilder;

pub mod opcodes {
    // client → server
    pub const ENTER_WORLD: u8 = 0x01;
    pub const MOVE: u8 = 0x02;
    pub const ATTACK_MOB: u8 = 0x03;
    pub const ATTACK_PLAYER: u8 = 0x04;
    pub const DEAL_DAMAGE: u8 = 0x05;
    pub const RESPAWN: u8 = 0x06;

    // server → client
    pub const NOTICE: u8 = 0x0E;
    pub const PLAYER_APPEAR: u8 = 0x21;
    pub const PLAYER_DISAPPEAR: u8 = 0x22;
    pub const PLAYER_MOVE: u8 = 0x23;
    pub const PLAYER_ATTACK: u8 = 0x24;
    pub const PLAYER_DEATH: u8 = 0x25;
    pub const HP_UPDATE: u8 = 0x26;
    pub const MOB_APPEAR: u8 = 0x31;
    pub const MOB_DISAPPEAR: u8 = 0x32;
    pub const MOB_MOVE: u8 = 0x33;
    pub const MOB_ATTACK: u8 = 0x34;
    pub const MOB_DEATH: u8 = 0x35;
    pub const NPC_APPEAR: u8 = 0x41;
    pub const NPC_DISAPPEAR: u8 = 0x42;
    pub const PET_APPEAR: u8 = 0x51;
    pub const PET_DISAPPEAR: u8 = 0x52;
    pub const DROP_APPEAR: u8 = 0x61;
    pub const DROP_DISAPPEAR: u8 = 0x62;
    pub const HOUSING_APPEAR: u8 = 0x71;
    pub const HOUSING_DISAPPEAR: u8 = 0x72;
    pub const BABY_PET_APPEAR: u8 = 0x81;
    pub const BABY_PET_DISAPPEAR: u8 = 0x82;
    pub const STONE_APPEAR: u8 = 0x91;
}

use opcodes::*;

fn put_position(builder: &mut PacketBuilder, at: &Coordinate) {
    builder.put_f32(at.x as f32).put_f32(at.y as f32);
}

/// Two-byte pseudo-ID packet used by every disappear opcode.
pub fn disappear(opcode: u8, pseudo_id: PseudoId) -> Vec<u8> {
    let mut builder = PacketBuilder::new(opcode);
    builder.put_int(pseudo_id as u64, 2, true);
    builder.finish()
}

pub fn player_appear(pseudo_id: PseudoId, id: EntityId, name: &str, status: &CharacterStatus) -> Vec<u8> {
    let mut b = PacketBuilder::new(PLAYER_APPEAR);
    b.put_int(pseudo_id as u64, 2, true)
        .put_int(id as u64, 4, true)
        .put_str(name)
        .put_int(status.level() as u64, 2, true)
        .put_u8(status.faction.code());
    put_position(&mut b, &status.coordinate);
    b.put_int(status.hp as u64, 4, true)
        .put_int(status.max_hp as u64, 4, true)
        .put_int(status.chi as u64, 4, true)
        .put_int(status.max_chi as u64, 4, true)
        .put_u8(status.buffs.len().min(u8::MAX as usize) as u8);
    for buff in status.buffs.iter().take(u8::MAX as usize) {
        b.put_int(*buff as u64, 2, true);
    }
    b.finish()
}

pub fn player_move(pseudo_id: PseudoId, from: &Coordinate, to: &Coordinate, running: bool) -> Vec<u8> {
    let mut b = PacketBuilder::new(PLAYER_MOVE);
    b.put_int(pseudo_id as u64, 2, true);
    put_position(&mut b, from);
    put_position(&mut b, to);
    b.put_u8(running as u8);
    b.finish()
}

/// An attack on a player or mob. The target pseudo-ID is big endian, as the
/// client reads it.
pub fn player_attack(attacker: PseudoId, target: PseudoId, damage: u64, target_hp: u32, is_skill: bool) -> Vec<u8> {
    let mut b = PacketBuilder::new(PLAYER_ATTACK);
    b.put_int(attacker as u64, 2, true)
        .put_int(target as u64, 2, false)
        .put_int(damage, 4, true)
        .put_int(target_hp as u64, 4, true)
        .put_u8(is_skill as u8);
    b.finish()
}

pub fn player_death(pseudo_id: PseudoId, killer: Option<EntityId>) -> Vec<u8> {
    let mut b = PacketBuilder::new(PLAYER_DEATH);
    b.put_int(pseudo_id as u64, 2, true)
        .put_int(killer.unwrap_or(0) as u64, 4, true);
    b.finish()
}

pub fn hp_update(hp: u32, max_hp: u32, chi: u32, max_chi: u32) -> Vec<u8> {
    let mut b = PacketBuilder::new(HP_UPDATE);
    b.put_int(hp as u64, 4, true)
        .put_int(max_hp as u64, 4, true)
        .put_int(chi as u64, 4, true)
        .put_int(max_chi as u64, 4, true);
    b.finish()
}

/// Mob appear packet. The name color depends on the observer's level.
pub fn mob_appear(ai: &Ai, status: &AiStatus, observer_level: u16) -> Vec<u8> {
    let mut b = PacketBuilder::new(MOB_APPEAR);
    b.put_int(ai.pseudo_id() as u64, 2, true)
        .put_int(ai.id as u64, 4, true)
        .put_int(ai.info.kind_id as u64, 4, true)
        .put_str(&ai.info.name)
        .put_int(ai.info.level() as u64, 2, true)
        .put_u8(level_color(observer_level, ai.info.level()))
        .put_u8(ai.info.faction.code());
    put_position(&mut b, &status.coordinate);
    put_position(&mut b, &status.target_location);
    b.put_int(status.hp as u64, 4, true)
        .put_int(ai.max_hp() as u64, 4, true)
        .put_int(status.chi as u64, 4, true)
        .put_u8(status.is_moving as u8);
    b.finish()
}

pub fn mob_move(pseudo_id: PseudoId, from: &Coordinate, to: &Coordinate, speed: f64) -> Vec<u8> {
    let mut b = PacketBuilder::new(MOB_MOVE);
    b.put_int(pseudo_id as u64, 2, true);
    put_position(&mut b, from);
    put_position(&mut b, to);
    b.put_f32(speed as f32);
    b.finish()
}

pub fn mob_attack(mob: PseudoId, target: PseudoId, damage: u64, target_hp: u32) -> Vec<u8> {
    let mut b = PacketBuilder::new(MOB_ATTACK);
    b.put_int(mob as u64, 2, true)
        .put_int(target as u64, 2, true)
        .put_int(damage, 4, true)
        .put_int(target_hp as u64, 4, true);
    b.finish()
}

/// Kill broadcast; `loot` is the serialized drop list from the loot provider.
pub fn mob_death(pseudo_id: PseudoId, killer: Option<EntityId>, loot: &[u8]) -> Vec<u8> {
    let mut b = PacketBuilder::new(MOB_DEATH);
    b.put_int(pseudo_id as u64, 2, true)
        .put_int(killer.unwrap_or(0) as u64, 4, true)
        .put_bytes(loot);
    b.finish()
}

pub fn stone_appear(ai: &Ai, status: &AiStatus, stone: &WarStoneSnapshot) -> Vec<u8> {
    let mut b = PacketBuilder::new(STONE_APPEAR);
    b.put_int(ai.pseudo_id() as u64, 2, true)
        .put_int(ai.id as u64, 4, true)
        .put_u8(stone.owner.code())
        .put_int(stone.progress as i16 as u16 as u64, 2, true)
        .put_int(stone.zhuang as u64, 2, true)
        .put_int(stone.shao as u64, 2, true);
    put_position(&mut b, &status.coordinate);
    b.put_int(status.hp as u64, 4, true)
        .put_int(ai.max_hp() as u64, 4, true);
    b.finish()
}

pub fn npc_appear(npc: &NpcPosition) -> Vec<u8> {
    let mut b = PacketBuilder::new(NPC_APPEAR);
    b.put_int(npc.pseudo_id() as u64, 2, true)
        .put_int(npc.record.npc_id as u64, 4, true)
        .put_str(&npc.record.name);
    put_position(&mut b, &npc.record.coordinate);
    b.finish()
}

pub fn pet_appear(pet: &Pet, status: &PetStatus) -> Vec<u8> {
    let opcode = if pet.is_baby { BABY_PET_APPEAR } else { PET_APPEAR };
    let mut b = PacketBuilder::new(opcode);
    b.put_int(pet.pseudo_id() as u64, 2, true)
        .put_int(pet.owner_id as u64, 4, true)
        .put_str(&pet.name)
        .put_int(pet.level as u64, 2, true);
    put_position(&mut b, &status.coordinate);
    b.put_int(status.hp as u64, 4, true)
        .put_int(status.max_hp as u64, 4, true);
    b.finish()
}

pub fn drop_appear(drop: &DroppedItem) -> Vec<u8> {
    let mut b = PacketBuilder::new(DROP_APPEAR);
    b.put_int(drop.pseudo_id() as u64, 2, true)
        .put_int(drop.item_id as u64, 8, true)
        .put_int(drop.quantity as u64, 2, true)
        .put_int(drop.owner.unwrap_or(0) as u64, 4, true);
    put_position(&mut b, &drop.coordinate);
    b.finish()
}

pub fn housing_appear(item: &HousingItem) -> Vec<u8> {
    let mut b = PacketBuilder::new(HOUSING_APPEAR);
    b.put_int(item.pseudo_id() as u64, 2, true)
        .put_int(item.record.item_id as u64, 8, true)
        .put_int(item.record.owner_id as u64, 4, true);
    put_position(&mut b, &item.record.coordinate);
    b.finish()
}

/// Short text shown in the client's system message area.
pub fn notice(text: &str) -> Vec<u8> {
    let mut b = PacketBuilder::new(NOTICE);
    b.put_str(text);
    b.finish()
}
