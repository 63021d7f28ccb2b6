// Marked pointer operations using the least significant bit as the delete mark.
//
// Bit layout:
//   Bit 0: DELETE_MARK - the node owning this next pointer is logically removed
//
// A marked next pointer is frozen: no CAS expecting an unmarked value can
// succeed on it, so nothing can be linked behind a node that is being removed.
//
const DELETE_MARK: usize = 0b01;

/// A pointer that uses the least significant bit as the delete mark.
#[derive(Copy, Clone)]
pub(crate) struct MarkedPtr<T> {
    ptr: *mut T,
}

impl<T> MarkedPtr<T> {
    /// Create a new MarkedPtr from a (possibly marked) pointer.
    #[inline]
    pub(crate) fn new(ptr: *mut T) -> Self {
        MarkedPtr { ptr }
    }

    /// Strip the mark bit from a raw pointer.
    #[inline]
    pub(crate) fn unmask(ptr: *mut T) -> *mut T {
        (ptr as usize & !DELETE_MARK) as *mut T
    }

    /// Get the clean pointer without the mark bit (the one you dereference).
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut T {
        Self::unmask(self.ptr)
    }

    /// Get the raw pointer with the mark bit intact (for CAS operations).
    #[inline]
    pub(crate) fn as_raw(&self) -> *mut T {
        self.ptr
    }

    #[inline]
    pub(crate) fn is_marked(&self) -> bool {
        (self.ptr as usize & DELETE_MARK) != 0
    }

    /// Create the marked version of this pointer.
    #[inline]
    pub(crate) fn marked(&self) -> Self {
        MarkedPtr {
            ptr: (self.ptr as usize | DELETE_MARK) as *mut T,
        }
    }
}
