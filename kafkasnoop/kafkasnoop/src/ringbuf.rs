use std::borrow::Borrow;

use aya::maps::{MapData, RingBuf};
use tokio::io::unix::AsyncFd;

pub trait RingBufEventHandler {
    fn handle_event(&mut self, data: &[u8]);
}

/// Drains `ring_buf` into `handler` every time the map becomes readable.
pub async fn handle_ringbuf<T: Borrow<MapData>>(
    ring_buf: RingBuf<T>,
    handler: &mut impl RingBufEventHandler,
) -> anyhow::Result<()> {
    let mut async_fd = AsyncFd::new(ring_buf)?;

    loop {
        let mut guard = async_fd.readable_mut().await?;
        let rb = guard.get_inner_mut();
        while let Some(item) = rb.next() {
            handler.handle_event(&item);
        }
        guard.clear_ready();
    }
}
