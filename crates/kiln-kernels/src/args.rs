//! Packed kernel argument buffer with named slots.
//!
//! Values are laid out back to back at their natural alignment, which is the
//! layout a kernel receives through `HIP_LAUNCH_PARAM_BUFFER_POINTER`.

use std::collections::HashMap;
use std::mem::{align_of, size_of};

use bytemuck::Pod;
use kiln_core::Shape;

use crate::error::KernelError;
use crate::Result;

#[derive(Debug, Clone)]
struct Slot {
    offset: usize,
    size: usize,
}

/// Byte buffer of kernel arguments addressable by name.
#[derive(Debug, Clone, Default)]
pub struct KernelArguments {
    data: Vec<u8>,
    slots: HashMap<String, Slot>,
    order: Vec<String>,
}

impl KernelArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` at the next offset aligned for `T`.
    ///
    /// Re-using a name shadows the earlier slot; the old bytes stay in place.
    pub fn append<T: Pod>(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        let align = align_of::<T>();
        let offset = (self.data.len() + align - 1) / align * align;
        self.data.resize(offset, 0);
        self.data.extend_from_slice(bytemuck::bytes_of(&value));

        if self.slots.contains_key(&name) {
            self.order.retain(|n| n != &name);
        }
        self.order.push(name.clone());
        self.slots.insert(
            name,
            Slot {
                offset,
                size: size_of::<T>(),
            },
        );
    }

    /// Overwrite the bytes of an existing slot. The value must have the
    /// exact size the slot was created with.
    pub fn update_value<T: Pod>(&mut self, name: &str, value: T) -> Result<()> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| KernelError::MissingArgument(name.to_string()))?;
        if slot.size != size_of::<T>() {
            return Err(KernelError::ArgumentSize {
                name: name.to_string(),
                expected: slot.size,
                actual: size_of::<T>(),
            });
        }
        self.data[slot.offset..slot.offset + slot.size].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Read a slot back as `T`, or None if absent or of another size.
    pub fn get<T: Pod>(&self, name: &str) -> Option<T> {
        let slot = self.slots.get(name)?;
        if slot.size != size_of::<T>() {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(
            &self.data[slot.offset..slot.offset + slot.size],
        ))
    }

    /// Byte offset of a slot within the buffer.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.slots.get(name).map(|s| s.offset)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Append `<prefix>_size<i>` and `<prefix>_stride<i>` as `u32` for every
    /// dimension of `shape`, in dimension order.
    pub fn append_shape(&mut self, prefix: &str, shape: &Shape) -> Result<()> {
        for (i, dim) in shape.dims().iter().enumerate() {
            let size_name = format!("{prefix}_size{i}");
            let size = narrow(&size_name, dim.size)?;
            self.append(size_name, size);

            let stride_name = format!("{prefix}_stride{i}");
            let stride = narrow(&stride_name, dim.stride)?;
            self.append(stride_name, stride);
        }
        Ok(())
    }

    /// Slot names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn narrow(name: &str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| KernelError::ArgumentOverflow {
        name: name.to_string(),
        value,
    })
}
