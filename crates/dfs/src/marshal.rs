// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Conversion of caller data into the shapes the backend entry points accept.
//!
//! Strings become owned zero-terminated copies that are freed when they go out of scope.
//! Scatter-gather lists are materialized as `d_iov_t` arrays that point into caller memory
//! without copying and borrow that memory for as long as the descriptor exists.

use std::ffi::CString;
use std::io::IoSlice;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::sys::{d_iov_t, d_sg_list_t};

/// Copies `value` into a zero-terminated buffer.
///
/// Interior NUL bytes are rejected as [`InvalidArgument`](crate::ErrorKind::InvalidArgument);
/// allocation failure is reported as [`IoFailure`](crate::ErrorKind::IoFailure).
pub(crate) fn c_string(value: &str, context: impl FnOnce() -> String) -> Result<CString> {
    let mut bytes = Vec::new();
    if bytes.try_reserve_exact(value.len() + 1).is_err() {
        return Err(Error::out_of_memory(context()));
    }
    bytes.extend_from_slice(value.as_bytes());
    bytes.push(0);

    CString::from_vec_with_nul(bytes).map_err(|e| Error::invalid_argument(format!("{}: {e}", context())))
}

/// An ordered list of caller-owned buffers that a read fills in sequence.
///
/// The list borrows the buffers mutably, so they cannot be touched while a read that uses them
/// is in progress. The total capacity is the sum of the buffer lengths.
///
/// # Examples
///
/// ```
/// use dfs::SgList;
///
/// let mut header = [0_u8; 16];
/// let mut body = vec![0_u8; 4096];
///
/// let sgl = SgList::new().with(&mut header).with(&mut body);
/// assert_eq!(sgl.capacity(), 4112);
/// assert_eq!(sgl.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SgList<'a> {
    buffers: Vec<&'a mut [u8]>,
}

impl<'a> SgList<'a> {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffers: Vec::new() }
    }

    /// Appends a buffer, returning the list for chaining.
    #[must_use]
    pub fn with(mut self, buffer: &'a mut [u8]) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Appends a buffer.
    pub fn push(&mut self, buffer: &'a mut [u8]) -> &mut Self {
        self.buffers.push(buffer);
        self
    }

    /// Total number of bytes the list can receive.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffers.iter().map(|b| b.len()).sum()
    }

    /// Number of buffers in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the list has no buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// The buffers, in order.
    pub fn buffers(&mut self) -> impl Iterator<Item = &mut [u8]> {
        self.buffers.iter_mut().map(|b| &mut **b)
    }

    /// Describes the first `limit` bytes of the list for a read.
    ///
    /// Buffers are consumed in order; the last described buffer may be partial and buffers
    /// beyond `limit` are not described at all, so the backend cannot touch them.
    pub(crate) fn describe(&mut self, limit: usize, context: impl FnOnce() -> String) -> Result<RawSgl<'_>> {
        describe_buffers(self.buffers.iter_mut().map(|b| &mut **b), limit, context)
    }
}

/// Like [`SgList::describe`], for buffers the caller has handed over.
pub(crate) fn describe_owned(buffers: &mut [Vec<u8>], limit: usize, context: impl FnOnce() -> String) -> Result<RawSgl<'_>> {
    describe_buffers(buffers.iter_mut().map(Vec::as_mut_slice), limit, context)
}

fn describe_buffers<'s>(
    buffers: impl ExactSizeIterator<Item = &'s mut [u8]>,
    limit: usize,
    context: impl FnOnce() -> String,
) -> Result<RawSgl<'s>> {
    let mut iovs = Vec::new();
    if iovs.try_reserve_exact(buffers.len()).is_err() {
        return Err(Error::out_of_memory(context()));
    }

    let mut remaining = limit;
    for buffer in buffers {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(buffer.len());
        if take == 0 {
            continue;
        }
        iovs.push(d_iov_t {
            iov_buf: buffer.as_mut_ptr().cast(),
            iov_buf_len: take,
            iov_len: take,
        });
        remaining -= take;
    }

    Ok(RawSgl {
        iovs,
        _buffers: PhantomData,
    })
}

impl<'a> From<&'a mut [u8]> for SgList<'a> {
    fn from(buffer: &'a mut [u8]) -> Self {
        Self::new().with(buffer)
    }
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for SgList<'a> {
    fn from(buffer: &'a mut [u8; N]) -> Self {
        Self::new().with(buffer)
    }
}

/// Describes caller slices for a write.
///
/// The backend only reads through the described pointers.
pub(crate) fn describe_slices<'s>(slices: &'s [IoSlice<'_>], context: impl FnOnce() -> String) -> Result<RawSgl<'s>> {
    let mut iovs = Vec::new();
    if iovs.try_reserve_exact(slices.len()).is_err() {
        return Err(Error::out_of_memory(context()));
    }

    iovs.extend(slices.iter().filter(|s| !s.is_empty()).map(|s| d_iov_t {
        iov_buf: s.as_ptr().cast_mut().cast(),
        iov_buf_len: s.len(),
        iov_len: s.len(),
    }));

    Ok(RawSgl {
        iovs,
        _buffers: PhantomData,
    })
}

/// A materialized `d_iov_t` array pointing into caller memory.
///
/// The lifetime ties the descriptor to the borrowed buffers; it cannot outlive them.
#[derive(Debug)]
pub(crate) struct RawSgl<'s> {
    iovs: Vec<d_iov_t>,
    _buffers: PhantomData<&'s mut [u8]>,
}

impl RawSgl<'_> {
    /// Number of bytes described.
    pub(crate) fn described_len(&self) -> usize {
        self.iovs.iter().map(|iov| iov.iov_buf_len).sum()
    }

    /// Runs `f` with a `d_sg_list_t` view of the descriptor.
    ///
    /// The view, and the pointer to the iov array inside it, are only valid during `f`.
    pub(crate) fn with_sys<R>(&mut self, f: impl FnOnce(&mut d_sg_list_t) -> R) -> R {
        with_sys(&mut self.iovs, f)
    }
}

fn with_sys<R>(iovs: &mut [d_iov_t], f: impl FnOnce(&mut d_sg_list_t) -> R) -> R {
    let mut sgl = d_sg_list_t {
        sg_nr: u32::try_from(iovs.len()).unwrap_or(u32::MAX),
        sg_nr_out: 0,
        sg_iovs: iovs.as_mut_ptr(),
    };
    f(&mut sgl)
}
