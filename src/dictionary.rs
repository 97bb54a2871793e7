//! Display names for structures.
//!
//! Names are a presentation concern: nothing in the binary codec depends on
//! them.  A [`NameProvider`] maps a structure's tag/num, plus the tag/num
//! pairs of its ancestors (outermost first), to a name.

use std::collections::HashMap;

pub trait NameProvider {
    fn name_for(&self, tag: u16, num: u8, context: &[(u16, u8)]) -> String;
}

/// Renders `tag/num`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericNameProvider;

impl NameProvider for NumericNameProvider {
    fn name_for(&self, tag: u16, num: u8, _context: &[(u16, u8)]) -> String {
        format!("{}/{}", tag, num)
    }
}

/// Fixed tag/num → name table, falling back to `tag/num`.
#[derive(Debug, Default, Clone)]
pub struct MapNameProvider {
    names: HashMap<(u16, u8), String>,
}

impl MapNameProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: u16, num: u8, name: impl Into<String>) {
        self.names.insert((tag, num), name.into());
    }
}

impl NameProvider for MapNameProvider {
    fn name_for(&self, tag: u16, num: u8, context: &[(u16, u8)]) -> String {
        match self.names.get(&(tag, num)) {
            Some(name) => name.clone(),
            None       => NumericNameProvider.name_for(tag, num, context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_names() {
        assert_eq!(NumericNameProvider.name_for(12, 3, &[]), "12/3");
        assert_eq!(NumericNameProvider.name_for(0xffff, 255, &[(1, 1)]), "65535/255");
    }

    #[test]
    fn map_falls_back() {
        let mut names = MapNameProvider::new();
        names.insert(1, 7, "trigger");
        assert_eq!(names.name_for(1, 7, &[]), "trigger");
        assert_eq!(names.name_for(1, 8, &[]), "1/8");
    }
}
