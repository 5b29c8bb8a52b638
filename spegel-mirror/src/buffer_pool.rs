use std::sync::Mutex;

pub const BUFFER_SIZE: usize = 32 * 1024;

/// A pool of reusable 32 KiB byte buffers for body copies, safe for concurrent `get`/`put`.
///
/// A freelist of fixed-size scratch buffers so the mirror's hot proxy path doesn't allocate a
/// fresh buffer per chunk.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Takes a buffer from the pool, or allocates a fresh zeroed one if the pool is empty.
    pub fn get(&self) -> Vec<u8> {
        let mut free = self.free.lock().unwrap();
        free.pop().unwrap_or_else(|| vec![0u8; BUFFER_SIZE])
    }

    /// Returns a buffer to the pool for reuse. Buffers of an unexpected size are dropped instead
    /// of pooled, since a leaked oversized buffer would otherwise live in the pool forever.
    pub fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() != BUFFER_SIZE {
            return;
        }
        buf.clear();
        buf.resize(BUFFER_SIZE, 0);
        self.free.lock().unwrap().push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reused_buffer_comes_back_from_the_pool() {
        let pool = BufferPool::new();
        let buf = pool.get();
        assert_eq!(buf.len(), BUFFER_SIZE);
        pool.put(buf);
        assert_eq!(pool.free.lock().unwrap().len(), 1);
        let _ = pool.get();
        assert_eq!(pool.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn oversized_buffer_is_not_pooled() {
        let pool = BufferPool::new();
        pool.put(vec![0u8; BUFFER_SIZE * 2]);
        assert_eq!(pool.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn concurrent_get_and_put_do_not_panic() {
        let pool = Arc::new(BufferPool::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let buf = pool.get();
                    pool.put(buf);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
