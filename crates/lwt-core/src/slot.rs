//! Generational arena
//!
//! Hosts keep control blocks, channels and groups in a `Slab` and hand out
//! [`SlotKey`]s instead of pointers. A key names one *incarnation* of a slot:
//! freeing or [`rekey`](Slab::rekey)-ing the slot bumps its generation so
//! older keys stop resolving. Freed slots are reused LIFO.

/// Index + generation pair naming one incarnation of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Arena of `T` addressed by generational keys
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    /// LIFO stack of vacant indices
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store `value`, reusing the most recently freed slot if any
    pub fn insert(&mut self, value: T) -> SlotKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            let generation = match entry {
                Entry::Vacant { generation } => *generation,
                Entry::Occupied { .. } => unreachable!("free list names an occupied slot"),
            };
            *entry = Entry::Occupied { generation, value };
            return SlotKey { index, generation };
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry::Occupied { generation: 0, value });
        SlotKey { index, generation: 0 }
    }

    #[inline]
    pub fn get(&self, key: SlotKey) -> Option<&T> {
        match self.entries.get(key.index as usize)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        match self.entries.get_mut(key.index as usize)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Remove and return the value; the slot's generation moves on
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let entry = self.entries.get_mut(key.index as usize)?;
        match &*entry {
            Entry::Occupied { generation, .. } if *generation == key.generation => {}
            _ => return None,
        }
        let next = Entry::Vacant {
            generation: key.generation.wrapping_add(1),
        };
        match std::mem::replace(entry, next) {
            Entry::Occupied { value, .. } => {
                self.free.push(key.index);
                self.len -= 1;
                Some(value)
            }
            Entry::Vacant { .. } => None,
        }
    }

    /// Keep the value in place but retire `key`, returning the key for the
    /// new incarnation. Used to recycle control blocks without moving them.
    pub fn rekey(&mut self, key: SlotKey) -> Option<SlotKey> {
        match self.entries.get_mut(key.index as usize)? {
            Entry::Occupied { generation, .. } if *generation == key.generation => {
                *generation = generation.wrapping_add(1);
                Some(SlotKey {
                    index: key.index,
                    generation: *generation,
                })
            }
            _ => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| match e {
            Entry::Occupied { generation, value } => Some((
                SlotKey {
                    index: i as u32,
                    generation: *generation,
                },
                value,
            )),
            Entry::Vacant { .. } => None,
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.iter().map(|(_, v)| v)
    }
}
