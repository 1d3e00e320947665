use std::rc::Rc;

use super::value::{Obj, Value};

const TABLE_MAX_LOAD: f64 = 0.75;
const TABLE_MIN_CAP: usize = 8;

/// FNV-1a over the raw bytes. Every string key in the system is hashed with
/// this function, once, at allocation.
pub fn hash_str(key: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in key.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[derive(Debug, Clone)]
struct Entry {
    key: Option<Rc<Obj>>,
    value: Value,
}

impl Entry {
    // An empty slot is {None, Nil}; a tombstone is {None, Bool(true)}.
    const EMPTY: Entry = Entry {
        key: None,
        value: Value::Nil,
    };

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Nil)
    }
}

/// Open-addressed hash table with linear probing and tombstones, keyed by
/// interned strings. One instance is the intern set itself; another backs
/// the VM's globals.
///
/// `get`/`set`/`delete` compare keys by pointer only. That is sound because
/// every key goes through `intern` first, which is the one place keys are
/// compared by content.
#[derive(Debug, Default)]
pub struct Table {
    count: usize, // live entries plus tombstones
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    pub fn get(&self, key: &Rc<Obj>) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[Self::find_entry(&self.entries, key)];
        entry.key.as_ref().map(|_| entry.value.clone())
    }

    /// Inserts or overwrites. Returns true when the key was not present.
    pub fn set(&mut self, key: Rc<Obj>, value: Value) -> bool {
        if (self.count + 1) as f64 > self.entries.len() as f64 * TABLE_MAX_LOAD {
            let cap = (self.entries.len() * 2).max(TABLE_MIN_CAP);
            self.adjust_capacity(cap);
        }

        let index = Self::find_entry(&self.entries, &key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        // Reusing a tombstone keeps the count unchanged; the tombstone was
        // already counted when its original entry went in.
        if is_new && !entry.is_tombstone() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    /// Replaces the entry with a tombstone so probe sequences that pass
    /// through it stay intact. The count is not decremented.
    pub fn delete(&mut self, key: &Rc<Obj>) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.value = Value::Bool(true);
        true
    }

    pub fn add_all(&mut self, from: &Table) {
        for entry in &from.entries {
            if let Some(key) = &entry.key {
                self.set(Rc::clone(key), entry.value.clone());
            }
        }
    }

    /// Content-based lookup, used only while interning: hash first, then
    /// bytes, never pointers, because interning is what establishes pointer
    /// identity in the first place.
    pub fn find_string(&self, text: &str, hash: u32) -> Option<Rc<Obj>> {
        if self.count == 0 {
            return None;
        }
        let cap = self.entries.len();
        let mut index = hash as usize % cap;
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                None => {
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(key) => {
                    if key.hash() == hash && key.as_str() == text {
                        return Some(Rc::clone(key));
                    }
                }
            }
            index = (index + 1) % cap;
        }
    }

    /// The canonical object for `text`: an existing interned string if one
    /// matches, otherwise a fresh allocation registered in the table.
    pub fn intern(&mut self, text: String) -> Rc<Obj> {
        let hash = hash_str(&text);
        if let Some(existing) = self.find_string(&text, hash) {
            return existing;
        }
        let obj = Rc::new(Obj::Str { text, hash });
        self.set(Rc::clone(&obj), Value::Nil);
        obj
    }

    /// Slot for `key`: its current entry, else the first tombstone on its
    /// probe sequence, else the trailing empty slot.
    fn find_entry(entries: &[Entry], key: &Rc<Obj>) -> usize {
        let cap = entries.len();
        let mut index = key.hash() as usize % cap;
        let mut tombstone = None;
        loop {
            let entry = &entries[index];
            match &entry.key {
                None => {
                    if entry.is_tombstone() {
                        tombstone.get_or_insert(index);
                    } else {
                        return tombstone.unwrap_or(index);
                    }
                }
                Some(existing) => {
                    if Rc::ptr_eq(existing, key) {
                        return index;
                    }
                }
            }
            index = (index + 1) % cap;
        }
    }

    /// Rehashes live entries into a larger array. Tombstones are dropped,
    /// so the count is rebuilt from scratch.
    fn adjust_capacity(&mut self, cap: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; cap]);
        self.count = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let index = Self::find_entry(&self.entries, &key);
                self.entries[index] = Entry {
                    key: Some(key),
                    value: entry.value,
                };
                self.count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(table: &mut Table, text: &str) -> Rc<Obj> {
        table.intern(text.to_string())
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(hash_str(""), 2166136261);
        assert_eq!(hash_str("a"), 0xe40c292c);
        assert_eq!(hash_str("foobar"), 0xbf9cf968);
    }

    #[test]
    fn set_get_roundtrip() {
        let mut table = Table::new();
        let name = key(&mut table, "answer");
        assert!(table.set(Rc::clone(&name), Value::Number(42.0)));
        assert_eq!(table.get(&name), Some(Value::Number(42.0)));
    }

    #[test]
    fn set_reports_new_keys_only() {
        let mut table = Table::new();
        let name = key(&mut table, "x");
        assert!(table.set(Rc::clone(&name), Value::Number(1.0)));
        assert!(!table.set(Rc::clone(&name), Value::Number(2.0)));
        assert_eq!(table.get(&name), Some(Value::Number(2.0)));
    }

    #[test]
    fn get_missing_key() {
        let mut strings = Table::new();
        let name = key(&mut strings, "ghost");
        let table = Table::new();
        assert_eq!(table.get(&name), None);
    }

    #[test]
    fn delete_installs_tombstone_and_probing_survives() {
        let mut table = Table::new();
        let keys: Vec<Rc<Obj>> = (0..16).map(|i| key(&mut table, &format!("k{}", i))).collect();
        for (i, k) in keys.iter().enumerate() {
            table.set(Rc::clone(k), Value::Number(i as f64));
        }
        assert!(table.delete(&keys[3]));
        assert!(!table.delete(&keys[3]));
        assert_eq!(table.get(&keys[3]), None);
        // Every other entry is still reachable through any tombstones.
        for (i, k) in keys.iter().enumerate() {
            if i != 3 {
                assert_eq!(table.get(k), Some(Value::Number(i as f64)), "key k{}", i);
            }
        }
    }

    #[test]
    fn tombstone_reuse_does_not_grow_count() {
        let mut table = Table::new();
        let a = key(&mut table, "a");
        table.set(Rc::clone(&a), Value::Number(1.0));
        let count_before = table.count;
        table.delete(&a);
        assert_eq!(table.count, count_before);
        table.set(Rc::clone(&a), Value::Number(2.0));
        assert_eq!(table.count, count_before);
        assert_eq!(table.get(&a), Some(Value::Number(2.0)));
    }

    #[test]
    fn growth_preserves_entries() {
        let mut table = Table::new();
        let keys: Vec<Rc<Obj>> = (0..100).map(|i| key(&mut table, &format!("g{}", i))).collect();
        for (i, k) in keys.iter().enumerate() {
            table.set(Rc::clone(k), Value::Number(i as f64));
        }
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(table.get(k), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn add_all_copies_live_entries() {
        let mut source = Table::new();
        let a = key(&mut source, "a");
        let b = key(&mut source, "b");
        source.set(Rc::clone(&a), Value::Number(1.0));
        source.set(Rc::clone(&b), Value::Number(2.0));
        source.delete(&b);

        let mut dest = Table::new();
        dest.add_all(&source);
        assert_eq!(dest.get(&a), Some(Value::Number(1.0)));
        assert_eq!(dest.get(&b), None);
    }

    #[test]
    fn intern_returns_the_same_handle_for_equal_content() {
        let mut strings = Table::new();
        let first = strings.intern("hello".to_string());
        let second = strings.intern("hello".to_string());
        assert!(Rc::ptr_eq(&first, &second));
        let other = strings.intern("world".to_string());
        assert!(!Rc::ptr_eq(&first, &other));
    }

    #[test]
    fn find_string_compares_content_not_pointers() {
        let mut strings = Table::new();
        let interned = strings.intern("needle".to_string());
        let found = strings.find_string("needle", hash_str("needle"));
        assert!(found.is_some_and(|f| Rc::ptr_eq(&f, &interned)));
        assert!(strings.find_string("missing", hash_str("missing")).is_none());
    }
}
