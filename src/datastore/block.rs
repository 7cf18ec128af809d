//! Sequential and sparse datastore blocks.
//!
//! A block answers `getValues`/`setValues` against a `u16` address space.
//! Address arithmetic never wraps: a range that would cross `0x10000` is
//! always `IllegalDataAddress`, checked before any block-specific lookup.

use std::collections::BTreeMap;

use crate::error::{Error, Result as CrateResult};
use crate::pdu::ExceptionCode;

/// Outcome of a datastore read/write: either the requested values (or
/// success) or the specific exception the server pipeline should report.
/// This is deliberately not [`crate::error::Error`] — an out-of-range
/// address is an expected protocol outcome, not a failure of this crate.
pub type BlockResult<T> = std::result::Result<T, ExceptionCode>;

fn address_range_ok(address: u16, count: usize) -> bool {
    (address as u64) + (count as u64) <= 0x1_0000
}

/// Shared behavior of sequential and sparse blocks, independent of the
/// value type they hold.
pub trait Block<V: Clone> {
    fn validate(&self, address: u16, count: u16) -> bool;
    fn get_values(&self, address: u16, count: u16) -> BlockResult<Vec<V>>;
    fn set_values(&mut self, address: u16, values: &[V]) -> BlockResult<()>;
    fn reset(&mut self);
}

/// A contiguous run of values starting at `base_address`. Address `a` is
/// valid iff `base <= a < base + len`.
#[derive(Debug, Clone)]
pub struct SequentialBlock<V> {
    base_address: u16,
    initial: Vec<V>,
    values: Vec<V>,
}

impl<V: Clone> SequentialBlock<V> {
    pub fn new(base_address: u16, values: Vec<V>) -> Self {
        Self {
            base_address,
            initial: values.clone(),
            values,
        }
    }

    pub fn base_address(&self) -> u16 {
        self.base_address
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index_of(&self, address: u16) -> Option<usize> {
        let offset = address.checked_sub(self.base_address)? as usize;
        if offset < self.values.len() {
            Some(offset)
        } else {
            None
        }
    }
}

impl<V: Clone> Block<V> for SequentialBlock<V> {
    fn validate(&self, address: u16, count: u16) -> bool {
        if count == 0 || !address_range_ok(address, count as usize) {
            return false;
        }
        let Some(start) = self.index_of(address) else {
            return false;
        };
        start + count as usize <= self.values.len()
    }

    fn get_values(&self, address: u16, count: u16) -> BlockResult<Vec<V>> {
        if !self.validate(address, count) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let start = self.index_of(address).unwrap();
        Ok(self.values[start..start + count as usize].to_vec())
    }

    fn set_values(&mut self, address: u16, values: &[V]) -> BlockResult<()> {
        if !self.validate(address, values.len() as u16) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let start = self.index_of(address).unwrap();
        self.values[start..start + values.len()].clone_from_slice(values);
        Ok(())
    }

    fn reset(&mut self) {
        self.values = self.initial.clone();
    }
}

/// Construction-time policy for a sparse block: whether writes may
/// introduce new keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseMutability {
    /// Writes to unknown keys insert them.
    Mutable,
    /// Writes to unknown keys fail. Application code calling `set_values`
    /// directly gets a [`Error::Parameter`] (programmer misuse); the
    /// server dispatch path maps the same condition to
    /// `ExceptionCode::IllegalDataAddress` instead (see
    /// [`SparseBlock::set_values_from_wire`]).
    Fixed,
}

/// A `u16 -> V` mapping with unique keys. `getValues(a, n)` fails with
/// `IllegalDataAddress` if any address in `a..a+n` is absent.
#[derive(Debug, Clone)]
pub struct SparseBlock<V> {
    initial: BTreeMap<u16, V>,
    values: BTreeMap<u16, V>,
    mutability: SparseMutability,
}

/// Input accepted by [`SparseBlock::create`], mirroring
/// `ModbusSparseDataBlock.create`'s three accepted shapes.
pub enum SparseInit<V> {
    Empty,
    List(Vec<V>),
    Map(BTreeMap<u16, V>),
}

impl<V: Clone> SparseBlock<V> {
    /// Builds a sparse block from `init`, defaulting to mutable. A bare
    /// scalar value is not a valid `init` shape at all — in Rust that is
    /// a type error, not a runtime one, so unlike pymodbus's
    /// `ModbusSparseDataBlock(1)` there is nothing to reject at
    /// construction time beyond what the type system already refuses.
    pub fn create(init: SparseInit<V>) -> Self {
        Self::with_mutability(init, SparseMutability::Mutable)
    }

    pub fn with_mutability(init: SparseInit<V>, mutability: SparseMutability) -> Self {
        let values = match init {
            SparseInit::Empty => BTreeMap::new(),
            SparseInit::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i as u16, v))
                .collect(),
            SparseInit::Map(map) => map,
        };
        Self {
            initial: values.clone(),
            values,
            mutability,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.mutability == SparseMutability::Fixed
    }

    pub fn iter_keys(&self) -> impl Iterator<Item = &u16> {
        self.values.keys()
    }

    /// Application-facing write: on a fixed block, an unknown key is a
    /// [`Error::Parameter`] — programmer misuse, not a protocol outcome.
    pub fn set_values(&mut self, address: u16, values: &[V]) -> CrateResult<()> {
        if self.mutability == SparseMutability::Fixed {
            for i in 0..values.len() as u16 {
                let key = address.checked_add(i).ok_or_else(|| {
                    Error::parameter(format!("address {address} + {i} overflows u16"))
                })?;
                if !self.values.contains_key(&key) {
                    return Err(Error::parameter(format!(
                        "key {key} does not exist on this fixed sparse block"
                    )));
                }
            }
        }
        for (i, value) in values.iter().enumerate() {
            let key = address + i as u16;
            self.values.insert(key, value.clone());
        }
        Ok(())
    }

    /// Wire-driven write (a PDU handler on behalf of a remote peer): the
    /// same "unknown key on a fixed block" condition becomes
    /// `IllegalDataAddress` instead of a parameter error, because the
    /// peer made a normal protocol-level mistake, not a programming one.
    pub fn set_values_from_wire(&mut self, address: u16, values: &[V]) -> BlockResult<()> {
        match self.set_values(address, values) {
            Ok(()) => Ok(()),
            Err(_) => Err(ExceptionCode::IllegalDataAddress),
        }
    }
}

impl<V: Clone> Block<V> for SparseBlock<V> {
    fn validate(&self, address: u16, count: u16) -> bool {
        if count == 0 || !address_range_ok(address, count as usize) {
            return false;
        }
        (0..count).all(|i| self.values.contains_key(&(address + i)))
    }

    fn get_values(&self, address: u16, count: u16) -> BlockResult<Vec<V>> {
        if !self.validate(address, count) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok((0..count)
            .map(|i| self.values[&(address + i)].clone())
            .collect())
    }

    fn set_values(&mut self, address: u16, values: &[V]) -> BlockResult<()> {
        self.set_values_from_wire(address, values)
    }

    fn reset(&mut self) {
        self.values = self.initial.clone();
    }
}
