//! Aligned storage for complex amplitudes
//!
//! [`ComplexBuffer`] is the raw backing store of both state vectors (2^n
//! entries) and density matrices (4^n entries, row-major). Memory is
//! zero-initialised and 64-byte aligned so kernels can stream it with wide
//! vector loads.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};
use num_complex::Complex64;

use crate::error::{EngineError, Result};
use crate::quantum::Representation;

/// Alignment of every buffer allocation (one cache line, wide enough for AVX-512)
pub const BUFFER_ALIGNMENT: usize = 64;

/// Contiguous, aligned, heap-allocated run of `Complex64`
pub struct ComplexBuffer {
    data: NonNull<Complex64>,
    len: usize,
    layout: Layout,
}

impl ComplexBuffer {
    /// Allocate the buffer for an `qubit_count`-qubit register
    ///
    /// State vectors hold 2^n entries and density matrices 4^n. Sizes that
    /// overflow the address space, or that the allocator refuses, are
    /// reported as [`EngineError::Allocation`].
    pub fn for_register(qubit_count: usize, representation: Representation) -> Result<Self> {
        if qubit_count == 0 {
            return Err(EngineError::InvalidQubitCount { qubit_count });
        }

        let entries = representation.entry_count(qubit_count);

        let allocation_error = |entries: usize| EngineError::Allocation {
            qubit_count,
            representation,
            entries,
        };

        let len = entries.ok_or_else(|| allocation_error(usize::MAX))?;
        Self::zeroed(len).ok_or_else(|| allocation_error(len))
    }

    /// Allocate `len` zeroed entries, or `None` if the allocation is impossible
    pub fn zeroed(len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let size = len.checked_mul(std::mem::size_of::<Complex64>())?;
        let layout = Layout::from_size_align(size, BUFFER_ALIGNMENT).ok()?;

        // Safety: layout has non-zero size. An all-zero bit pattern is 0.0 + 0.0i.
        let data = unsafe { alloc::alloc_zeroed(layout) as *mut Complex64 };
        let data = NonNull::new(data)?;

        Some(Self { data, len, layout })
    }

    /// Allocate a copy of `values`
    pub fn from_slice(values: &[Complex64]) -> Option<Self> {
        let mut buffer = Self::zeroed(values.len())?;
        buffer.as_mut_slice().copy_from_slice(values);
        Some(buffer)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[Complex64] {
        // Safety: `data` points to `len` initialised entries owned by self
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        // Safety: `data` points to `len` initialised entries, uniquely borrowed
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    /// Check the allocation honours [`BUFFER_ALIGNMENT`]
    #[inline]
    pub fn is_aligned(&self) -> bool {
        (self.data.as_ptr() as usize) % BUFFER_ALIGNMENT == 0
    }

    pub fn view(&self) -> ArrayView1<'_, Complex64> {
        ArrayView1::from(self.as_slice())
    }

    pub fn view_mut(&mut self) -> ArrayViewMut1<'_, Complex64> {
        ArrayViewMut1::from(self.as_mut_slice())
    }

    /// View the buffer as a row-major `dim × dim` matrix
    pub fn matrix_view(&self, dim: usize) -> Result<ArrayView2<'_, Complex64>> {
        self.check_square(dim)?;
        ArrayView2::from_shape((dim, dim), self.as_slice())
            .map_err(|_| EngineError::DimensionMismatch { expected: dim * dim, actual: self.len })
    }

    pub fn matrix_view_mut(&mut self, dim: usize) -> Result<ArrayViewMut2<'_, Complex64>> {
        self.check_square(dim)?;
        let len = self.len;
        ArrayViewMut2::from_shape((dim, dim), self.as_mut_slice())
            .map_err(|_| EngineError::DimensionMismatch { expected: dim * dim, actual: len })
    }

    fn check_square(&self, dim: usize) -> Result<()> {
        match dim.checked_mul(dim) {
            Some(expected) if expected == self.len => Ok(()),
            Some(expected) => Err(EngineError::DimensionMismatch { expected, actual: self.len }),
            None => Err(EngineError::DimensionMismatch { expected: usize::MAX, actual: self.len }),
        }
    }

    pub fn fill_zero(&mut self) {
        self.as_mut_slice().fill(Complex64::new(0.0, 0.0));
    }

    /// Overwrite this buffer with the contents of `other`
    pub fn copy_from(&mut self, other: &ComplexBuffer) -> Result<()> {
        if other.len != self.len {
            return Err(EngineError::DimensionMismatch { expected: self.len, actual: other.len });
        }
        self.as_mut_slice().copy_from_slice(other.as_slice());
        Ok(())
    }

    /// Σ|z|², with Kahan compensation so long buffers don't drift
    pub fn norm_sqr(&self) -> f64 {
        kahan_sum(self.as_slice().iter().map(|z| z.norm_sqr()))
    }

    /// Multiply every entry by a real factor
    pub fn scale(&mut self, factor: f64) {
        for z in self.as_mut_slice() {
            *z *= factor;
        }
    }
}

/// Compensated summation of a stream of reals
pub(crate) fn kahan_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for value in values {
        let y = value - compensation;
        let t = sum + y;
        compensation = (t - sum) - y;
        sum = t;
    }
    sum
}

impl Clone for ComplexBuffer {
    fn clone(&self) -> Self {
        match Self::from_slice(self.as_slice()) {
            Some(buffer) => buffer,
            None => alloc::handle_alloc_error(self.layout),
        }
    }
}

impl Drop for ComplexBuffer {
    fn drop(&mut self) {
        // Safety: allocated in `zeroed` with exactly this layout
        unsafe {
            alloc::dealloc(self.data.as_ptr() as *mut u8, self.layout);
        }
    }
}

impl PartialEq for ComplexBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for ComplexBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplexBuffer")
            .field("len", &self.len)
            .field("aligned", &self.is_aligned())
            .finish()
    }
}

// Safety: ComplexBuffer owns its allocation and hands out borrows under the
// usual &/&mut rules, exactly like Vec<Complex64>.
unsafe impl Send for ComplexBuffer {}
unsafe impl Sync for ComplexBuffer {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_register_sizes() {
        let sv = ComplexBuffer::for_register(3, Representation::StateVector).unwrap();
        assert_eq!(sv.len(), 8);
        let dm = ComplexBuffer::for_register(3, Representation::DensityMatrix).unwrap();
        assert_eq!(dm.len(), 64);
        assert!(sv.as_slice().iter().all(|z| *z == Complex64::new(0.0, 0.0)));
    }

    #[test]
    fn test_alignment() {
        for n in 1..8 {
            let buffer = ComplexBuffer::for_register(n, Representation::StateVector).unwrap();
            assert!(buffer.is_aligned());
            assert_eq!(buffer.as_slice().as_ptr() as usize % BUFFER_ALIGNMENT, 0);
        }
    }

    #[test]
    fn test_overflowing_register_is_allocation_error() {
        let err = ComplexBuffer::for_register(40, Representation::DensityMatrix).unwrap_err();
        assert!(matches!(err, EngineError::Allocation { qubit_count: 40, .. }));

        let err = ComplexBuffer::for_register(usize::MAX, Representation::DensityMatrix).unwrap_err();
        assert!(matches!(err, EngineError::Allocation { entries: usize::MAX, .. }));
    }

    #[test]
    fn test_zero_qubits_rejected() {
        let err = ComplexBuffer::for_register(0, Representation::StateVector).unwrap_err();
        assert_eq!(err, EngineError::InvalidQubitCount { qubit_count: 0 });
        assert!(ComplexBuffer::zeroed(0).is_none());
        assert!(ComplexBuffer::zeroed(usize::MAX).is_none());
    }

    #[test]
    fn test_norm_and_scale() {
        let values = vec![Complex64::new(3.0, 0.0), Complex64::new(0.0, 4.0)];
        let mut buffer = ComplexBuffer::from_slice(&values).unwrap();
        assert_relative_eq!(buffer.norm_sqr(), 25.0, epsilon = 1e-12);
        buffer.scale(0.2);
        assert_relative_eq!(buffer.norm_sqr(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_view_shape() {
        let mut buffer = ComplexBuffer::zeroed(16).unwrap();
        {
            let mut m = buffer.matrix_view_mut(4).unwrap();
            m[[1, 2]] = Complex64::new(1.0, 0.0);
        }
        assert_eq!(buffer.as_slice()[6], Complex64::new(1.0, 0.0));
        assert!(buffer.matrix_view(3).is_err());
    }

    #[test]
    fn test_clone_and_copy() {
        let values = vec![Complex64::new(1.0, 2.0); 4];
        let a = ComplexBuffer::from_slice(&values).unwrap();
        let b = a.clone();
        assert_eq!(a, b);
        assert!(b.is_aligned());

        let mut c = ComplexBuffer::zeroed(4).unwrap();
        c.copy_from(&a).unwrap();
        assert_eq!(c, a);
        assert!(c.copy_from(&ComplexBuffer::zeroed(2).unwrap()).is_err());
    }

    #[test]
    fn test_kahan_sum_small_terms() {
        let total = kahan_sum(std::iter::once(1.0).chain(std::iter::repeat(1e-16).take(10_000)));
        assert_relative_eq!(total, 1.0 + 1e-12, epsilon = 1e-15);
    }
}
