//! Generic object pool — allowed but not mandated by spec.md §9's
//! allocator-abstraction guidance. Used for command-stream chunk buffers in
//! the `RunCommand` relay.

use std::sync::Mutex;

pub struct ObjectPool<T> {
    free: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    max_free: usize,
}

impl<T> ObjectPool<T> {
    pub fn new(max_free: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            max_free,
        }
    }

    pub fn get(&self) -> T {
        self.free.lock().unwrap().pop().unwrap_or_else(|| (self.factory)())
    }

    pub fn put(&self, item: T) {
        let mut free = self.free.lock().unwrap();
        if free.len() < self.max_free {
            free.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers_instead_of_reallocating() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4, || Vec::with_capacity(64));
        let buf = pool.get();
        let ptr = buf.as_ptr();
        pool.put(buf);
        let reused = pool.get();
        assert_eq!(reused.as_ptr(), ptr);
    }

    #[test]
    fn drops_returns_past_capacity() {
        let pool: ObjectPool<u32> = ObjectPool::new(1, || 0);
        pool.put(1);
        pool.put(2);
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
