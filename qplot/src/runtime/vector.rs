//! Vector and matrix wrappers over shared numeric buffers
//!
//! A vector or matrix value is a wrapper around a raw numeric buffer.
//! The wrapper and the buffer are shared independently: several wrapper
//! values may alias one wrapper, and several wrappers (views) may alias
//! one buffer. Each level carries its own share count, and the buffer's
//! storage is reclaimed exactly once, when its own count reaches zero.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Result, RuntimeError};
use crate::runtime::value::Dims;

/// Shared handle to a raw numeric buffer
pub type RawRef = Rc<RefCell<RawBuf>>;

/// Shared handle to a vector wrapper
pub type VectorRef = Rc<RefCell<Vector>>;

/// Shared handle to a matrix wrapper
pub type MatrixRef = Rc<RefCell<Matrix>>;

/// Raw numeric storage shared by vector/matrix views
#[derive(Debug)]
pub struct RawBuf {
    /// Share count: how many wrappers alias this buffer
    pub refs: u32,
    data: Option<Vec<f64>>,
}

impl RawBuf {
    pub fn alloc(len: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| RuntimeError::out_of_memory("numeric buffer"))?;
        data.resize(len, 0.0);
        Ok(RawBuf {
            refs: 1,
            data: Some(data),
        })
    }

    pub fn into_ref(self) -> RawRef {
        Rc::new(RefCell::new(self))
    }

    pub fn data(&self) -> Option<&[f64]> {
        self.data.as_deref()
    }

    pub fn data_mut(&mut self) -> Option<&mut [f64]> {
        self.data.as_deref_mut()
    }

    pub fn is_freed(&self) -> bool {
        self.data.is_none()
    }

    /// Drop one share; reclaims the storage when the last share goes.
    /// Returns true when the storage was reclaimed by this call.
    pub fn release(&mut self) -> bool {
        if self.refs == 0 {
            return false;
        }
        self.refs -= 1;
        if self.refs == 0 {
            self.data.take();
            return true;
        }
        false
    }
}

/// Vector view over a raw buffer; elements share one physical dimension
#[derive(Debug)]
pub struct Vector {
    /// Share count: how many values alias this wrapper
    pub refs: u32,
    pub raw: RawRef,
    pub len: usize,
    pub dims: Dims,
}

impl Vector {
    /// Fresh zero-filled vector with its own buffer
    pub fn alloc(len: usize) -> Result<Self> {
        Ok(Vector {
            refs: 1,
            raw: RawBuf::alloc(len)?.into_ref(),
            len,
            dims: Dims::none(),
        })
    }

    /// A new wrapper viewing an existing buffer; bumps the buffer's
    /// share count
    pub fn view(raw: &RawRef, len: usize) -> Self {
        raw.borrow_mut().refs += 1;
        Vector {
            refs: 1,
            raw: raw.clone(),
            len,
            dims: Dims::none(),
        }
    }

    pub fn into_ref(self) -> VectorRef {
        Rc::new(RefCell::new(self))
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        if i >= self.len {
            return None;
        }
        self.raw.borrow().data().and_then(|d| d.get(i).copied())
    }

    pub fn set(&mut self, i: usize, x: f64) -> bool {
        if i >= self.len {
            return false;
        }
        let mut raw = self.raw.borrow_mut();
        match raw.data_mut().and_then(|d| d.get_mut(i)) {
            Some(slot) => {
                *slot = x;
                true
            }
            None => false,
        }
    }
}

/// Matrix view over a raw buffer in row-major order
#[derive(Debug)]
pub struct Matrix {
    /// Share count: how many values alias this wrapper
    pub refs: u32,
    pub raw: RawRef,
    pub rows: usize,
    pub cols: usize,
    pub dims: Dims,
}

impl Matrix {
    pub fn alloc(rows: usize, cols: usize) -> Result<Self> {
        Ok(Matrix {
            refs: 1,
            raw: RawBuf::alloc(rows.saturating_mul(cols))?.into_ref(),
            rows,
            cols,
            dims: Dims::none(),
        })
    }

    /// A new wrapper viewing an existing buffer; bumps the buffer's
    /// share count
    pub fn view(raw: &RawRef, rows: usize, cols: usize) -> Self {
        raw.borrow_mut().refs += 1;
        Matrix {
            refs: 1,
            raw: raw.clone(),
            rows,
            cols,
            dims: Dims::none(),
        }
    }

    pub fn into_ref(self) -> MatrixRef {
        Rc::new(RefCell::new(self))
    }

    pub fn get(&self, r: usize, c: usize) -> Option<f64> {
        if r >= self.rows || c >= self.cols {
            return None;
        }
        self.raw
            .borrow()
            .data()
            .and_then(|d| d.get(r * self.cols + c).copied())
    }

    pub fn set(&mut self, r: usize, c: usize, x: f64) -> bool {
        if r >= self.rows || c >= self.cols {
            return false;
        }
        let idx = r * self.cols + c;
        let mut raw = self.raw.borrow_mut();
        match raw.data_mut().and_then(|d| d.get_mut(idx)) {
            Some(slot) => {
                *slot = x;
                true
            }
            None => false,
        }
    }
}
