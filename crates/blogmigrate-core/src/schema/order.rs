//! Foreign key dependency ordering.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::mapping::SchemaMapping;

impl SchemaMapping {
    /// Table names ordered so every table comes after the tables it references.
    ///
    /// Ties are broken by name. Self-references and references to tables
    /// outside the mapping are ignored. Tables caught in a reference cycle
    /// are appended in name order.
    pub fn dependency_order(&self) -> Vec<String> {
        // parent -> children, child -> unresolved parent count
        let mut children: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();

        for (name, table) in &self.tables {
            let parents: BTreeSet<&str> = table
                .dependencies()
                .into_iter()
                .filter(|parent| self.tables.contains_key(*parent))
                .collect();
            pending.insert(name.as_str(), parents.len());
            for parent in parents {
                children.entry(parent).or_default().insert(name.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.tables.len());

        while let Some(name) = ready.pop_first() {
            pending.remove(name);
            order.push(name.to_string());

            for child in children.get(name).into_iter().flatten() {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }

        if !pending.is_empty() {
            let cyclic: Vec<&str> = pending.keys().copied().collect();
            warn!(tables = ?cyclic, "foreign key cycle; appending tables in name order");
            order.extend(cyclic.into_iter().map(str::to_string));
        }

        order
    }
}
