//! Fixed-arity collection over property instances.
//!
//! Wraps the ordered item sequence of an array-typed property. Replacement in
//! place (`set`) is always allowed; every length-changing operation is
//! refused with `UnsupportedStructuralChange` when the arity is fixed, so the
//! length can never drift from what the schema declared.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::instance::PropertyInstance;
use crate::schema::{Arity, PropertyKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayInstance {
    arity: Arity,
    /// Kind of every item, kept on the instance so dynamic appends and the
    /// inheritance pass can instantiate new items without the schema at hand.
    item: PropertyKind,
    items: Vec<PropertyInstance>,
}

impl ArrayInstance {
    pub(crate) fn new(arity: Arity, item: PropertyKind, items: Vec<PropertyInstance>) -> Self {
        Self { arity, item, items }
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn item_kind(&self) -> &PropertyKind {
        &self.item
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PropertyInstance> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PropertyInstance> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PropertyInstance> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, PropertyInstance> {
        self.items.iter_mut()
    }

    /// Replace the item at `index`, returning the previous one. Allowed for
    /// both arities since the length does not change.
    pub fn set(&mut self, index: usize, item: PropertyInstance) -> ModelResult<PropertyInstance> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or(ModelError::IndexOutOfBounds { index, len })?;
        Ok(std::mem::replace(slot, item))
    }

    fn check_mutable_length(&self) -> ModelResult<()> {
        match self.arity {
            Arity::Fixed { size } => Err(ModelError::UnsupportedStructuralChange { size }),
            Arity::Dynamic => Ok(()),
        }
    }

    pub fn insert(&mut self, index: usize, item: PropertyInstance) -> ModelResult<()> {
        self.check_mutable_length()?;
        if index > self.items.len() {
            return Err(ModelError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        self.items.insert(index, item);
        Ok(())
    }

    pub fn push(&mut self, item: PropertyInstance) -> ModelResult<()> {
        self.check_mutable_length()?;
        self.items.push(item);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> ModelResult<PropertyInstance> {
        self.check_mutable_length()?;
        if index >= self.items.len() {
            return Err(ModelError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self) -> ModelResult<()> {
        self.check_mutable_length()?;
        self.items.clear();
        Ok(())
    }

    pub fn append_all(&mut self, items: Vec<PropertyInstance>) -> ModelResult<()> {
        self.check_mutable_length()?;
        self.items.extend(items);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{PropertyValue, ScalarValue};
    use crate::schema::ScalarKind;
    use proptest::prelude::*;

    fn string_item(text: &str) -> PropertyInstance {
        PropertyInstance::fresh(
            "label".to_string(),
            PropertyValue::Value {
                kind: ScalarKind::String,
                value: Some(ScalarValue::String(text.to_string())),
            },
        )
    }

    fn fixed_array(size: usize) -> ArrayInstance {
        let items = (0..size).map(|i| string_item(&i.to_string())).collect();
        ArrayInstance::new(
            Arity::Fixed { size },
            PropertyKind::Scalar {
                scalar: ScalarKind::String,
            },
            items,
        )
    }

    fn dynamic_array() -> ArrayInstance {
        ArrayInstance::new(
            Arity::Dynamic,
            PropertyKind::Scalar {
                scalar: ScalarKind::String,
            },
            Vec::new(),
        )
    }

    #[test]
    fn fixed_array_rejects_every_length_change() {
        let mut array = fixed_array(4);

        assert!(matches!(
            array.insert(1, string_item("x")),
            Err(ModelError::UnsupportedStructuralChange { size: 4 })
        ));
        assert!(matches!(
            array.push(string_item("x")),
            Err(ModelError::UnsupportedStructuralChange { .. })
        ));
        assert!(matches!(
            array.remove_at(1),
            Err(ModelError::UnsupportedStructuralChange { .. })
        ));
        assert!(matches!(
            array.clear(),
            Err(ModelError::UnsupportedStructuralChange { .. })
        ));
        assert!(matches!(
            array.append_all(vec![string_item("x"), string_item("y")]),
            Err(ModelError::UnsupportedStructuralChange { .. })
        ));
        assert_eq!(array.len(), 4);
    }

    #[test]
    fn fixed_array_allows_in_place_replacement() {
        let mut array = fixed_array(4);
        let old = array.set(1, string_item("replaced")).unwrap();
        assert!(old.is_set());
        assert_eq!(array.len(), 4);
        assert!(matches!(
            &array.get(1).unwrap().value,
            PropertyValue::Value {
                value: Some(ScalarValue::String(s)),
                ..
            } if s == "replaced"
        ));
    }

    #[test]
    fn dynamic_array_supports_length_changes() {
        let mut array = dynamic_array();
        array.push(string_item("a")).unwrap();
        array.insert(0, string_item("b")).unwrap();
        array.append_all(vec![string_item("c")]).unwrap();
        assert_eq!(array.len(), 3);
        array.remove_at(0).unwrap();
        assert_eq!(array.len(), 2);
        array.clear().unwrap();
        assert!(array.is_empty());
    }

    #[test]
    fn set_out_of_bounds_reports_index() {
        let mut array = fixed_array(2);
        assert!(matches!(
            array.set(5, string_item("x")),
            Err(ModelError::IndexOutOfBounds { index: 5, len: 2 })
        ));
    }

    proptest! {
        /// The fixed-arity invariant: no sequence of operations changes the
        /// length, whatever mix of accepted and rejected calls it contains.
        #[test]
        fn fixed_length_never_drifts(ops in prop::collection::vec(0u8..5, 1..40)) {
            let mut array = fixed_array(4);
            for (step, op) in ops.iter().enumerate() {
                let item = string_item(&step.to_string());
                match op {
                    0 => { let _ = array.set(step % 4, item); }
                    1 => { let _ = array.insert(step % 5, item); }
                    2 => { let _ = array.remove_at(step % 5); }
                    3 => { let _ = array.clear(); }
                    _ => { let _ = array.append_all(vec![item]); }
                }
                prop_assert_eq!(array.len(), 4);
            }
        }
    }
}
