use std::ops::{Deref, DerefMut};

use crate::pdf::Object;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array(Vec<Object>);

impl Array {
    pub fn new() -> Self {
        Self(Vec::new())
    }
}

impl Deref for Array {
    type Target = Vec<Object>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Array {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Object>> for Array {
    fn from(objects: Vec<Object>) -> Self {
        Self(objects)
    }
}

impl<const N: usize> From<[Object; N]> for Array {
    fn from(objects: [Object; N]) -> Self {
        Self(objects.into())
    }
}

impl FromIterator<Object> for Array {
    fn from_iter<T: IntoIterator<Item = Object>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
