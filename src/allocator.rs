// Kernel heap on top of linked_list_allocator, mapped at KHEAP_BASE by
// mem_init().

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use linked_list_allocator::Heap;
use spin::Mutex;

pub struct HeapAllocator {
    heap: Mutex<Heap>,
}

impl HeapAllocator {
    pub const fn empty() -> HeapAllocator {
        HeapAllocator {
            heap: Mutex::new(Heap::empty()),
        }
    }

    /// Hand [offset, offset + size) to the heap. Called once from
    /// mem_init after the region is mapped.
    pub unsafe fn init(&self, offset: usize, size: usize) {
        self.heap.lock().init(offset as *mut u8, size);
    }
}

unsafe impl GlobalAlloc for HeapAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match self.heap.lock().allocate_first_fit(layout) {
            Ok(res) => {
                #[cfg(feature = "debug")]
                crate::println!("HeapAllocator: allocated {:?} at {:?}", layout, res.as_ptr());
                res.as_ptr()
            }
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(ptr) = ptr::NonNull::new(ptr) {
            self.heap.lock().deallocate(ptr, layout);
        }
    }
}
