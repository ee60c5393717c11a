//! Entity arena with intrusive per-bucket linked lists
//!
//! Entities live in a slot arena addressed by [`EntityId`]; each slot
//! carries `prev`/`next` links scoped to exactly one bucket at a time.
//! Buckets store only head/tail ids, so link and unlink are O(1) and
//! ownership stays with the arena.

use crate::scene::entity::SceneEntity;

/// Handle to an entity slot in the arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityId(pub u32);

/// Head/tail of one intrusive doubly-linked bucket
#[derive(Clone, Copy, Debug, Default)]
pub struct BucketList {
    pub head: Option<EntityId>,
    pub tail: Option<EntityId>,
}

impl BucketList {
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Slot arena for scene entities with a free list
#[derive(Debug, Default)]
pub struct EntityArena {
    slots: Vec<Option<SceneEntity>>,
    free: Vec<u32>,
    len: usize,
}

impl EntityArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, entity: SceneEntity) -> EntityId {
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(entity);
            EntityId(idx)
        } else {
            self.slots.push(Some(entity));
            EntityId(self.slots.len() as u32 - 1)
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<SceneEntity> {
        let entity = self.slots.get_mut(id.0 as usize)?.take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&SceneEntity> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut SceneEntity> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over all live entities
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &SceneEntity)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (EntityId(i as u32), e)))
    }

    /// Link an entity at the back of a bucket
    pub(crate) fn link_back(&mut self, list: &mut BucketList, id: EntityId) {
        debug_assert!(self.get(id).map(|e| e.prev.is_none() && e.next.is_none()) == Some(true));
        match list.tail {
            Some(tail) => {
                self.get_mut(tail).unwrap().next = Some(id);
                self.get_mut(id).unwrap().prev = Some(tail);
                list.tail = Some(id);
            }
            None => {
                list.head = Some(id);
                list.tail = Some(id);
            }
        }
    }

    /// Link an entity at the front of a bucket (shadow priority path)
    pub(crate) fn link_front(&mut self, list: &mut BucketList, id: EntityId) {
        debug_assert!(self.get(id).map(|e| e.prev.is_none() && e.next.is_none()) == Some(true));
        match list.head {
            Some(head) => {
                self.get_mut(head).unwrap().prev = Some(id);
                self.get_mut(id).unwrap().next = Some(head);
                list.head = Some(id);
            }
            None => {
                list.head = Some(id);
                list.tail = Some(id);
            }
        }
    }

    /// Unlink an entity from its bucket, clearing its links
    pub(crate) fn unlink(&mut self, list: &mut BucketList, id: EntityId) {
        let (prev, next) = {
            let e = self.get_mut(id).unwrap();
            let links = (e.prev, e.next);
            e.prev = None;
            e.next = None;
            links
        };

        match prev {
            Some(p) => self.get_mut(p).unwrap().next = next,
            None => list.head = next,
        }
        match next {
            Some(n) => self.get_mut(n).unwrap().prev = prev,
            None => list.tail = prev,
        }
    }

    /// Collect a bucket's entity ids in list order
    pub(crate) fn collect_list(&self, list: &BucketList, out: &mut Vec<EntityId>) {
        let mut cur = list.head;
        while let Some(id) = cur {
            out.push(id);
            cur = self.get(id).and_then(|e| e.next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::core::types::{Mat4, Vec3};
    use crate::scene::entity::EntityPayload;

    fn mesh_entity() -> SceneEntity {
        SceneEntity::new(EntityPayload::Mesh {
            world_box: Aabb::new(Vec3::ZERO, Vec3::ONE),
            transform: Mat4::IDENTITY,
            skinned: false,
            attachments: Vec::new(),
        })
    }

    fn ids_of(arena: &EntityArena, list: &BucketList) -> Vec<EntityId> {
        let mut out = Vec::new();
        arena.collect_list(list, &mut out);
        out
    }

    #[test]
    fn test_insert_remove_reuses_slots() {
        let mut arena = EntityArena::new();
        let a = arena.insert(mesh_entity());
        let b = arena.insert(mesh_entity());
        assert_eq!(arena.len(), 2);

        arena.remove(a).unwrap();
        assert_eq!(arena.len(), 1);
        assert!(!arena.contains(a));
        assert!(arena.contains(b));

        // Freed slot is reused
        let c = arena.insert(mesh_entity());
        assert_eq!(c, a);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_link_back_order() {
        let mut arena = EntityArena::new();
        let mut list = BucketList::default();
        let a = arena.insert(mesh_entity());
        let b = arena.insert(mesh_entity());
        let c = arena.insert(mesh_entity());

        arena.link_back(&mut list, a);
        arena.link_back(&mut list, b);
        arena.link_back(&mut list, c);

        assert_eq!(ids_of(&arena, &list), vec![a, b, c]);
        assert_eq!(list.head, Some(a));
        assert_eq!(list.tail, Some(c));
    }

    #[test]
    fn test_link_front_order() {
        let mut arena = EntityArena::new();
        let mut list = BucketList::default();
        let a = arena.insert(mesh_entity());
        let b = arena.insert(mesh_entity());

        arena.link_back(&mut list, a);
        arena.link_front(&mut list, b);

        assert_eq!(ids_of(&arena, &list), vec![b, a]);
    }

    #[test]
    fn test_unlink_middle_and_ends() {
        let mut arena = EntityArena::new();
        let mut list = BucketList::default();
        let a = arena.insert(mesh_entity());
        let b = arena.insert(mesh_entity());
        let c = arena.insert(mesh_entity());
        arena.link_back(&mut list, a);
        arena.link_back(&mut list, b);
        arena.link_back(&mut list, c);

        arena.unlink(&mut list, b);
        assert_eq!(ids_of(&arena, &list), vec![a, c]);
        let e = arena.get(b).unwrap();
        assert!(e.prev.is_none() && e.next.is_none());

        arena.unlink(&mut list, a);
        assert_eq!(ids_of(&arena, &list), vec![c]);
        assert_eq!(list.head, Some(c));
        assert_eq!(list.tail, Some(c));

        arena.unlink(&mut list, c);
        assert!(list.is_empty());
    }
}
