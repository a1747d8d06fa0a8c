//! End-of-call cleanup.
//!
//! `Teardown` is created right after the instance is registered and runs
//! exactly once, on `finish()` or on drop, so every exit path (success,
//! error, cancellation) releases the instance.

use crate::clone::{DocumentCloner, FrameOwnership};
use crate::frame::{FrameHandle, NamedFrameCache};
use crate::instance::{InstanceId, InstanceLogger, InstanceRegistry};
use std::sync::Arc;

pub struct Teardown {
    registry: Arc<InstanceRegistry>,
    frames: NamedFrameCache,
    cloner: Arc<dyn DocumentCloner>,
    id: InstanceId,
    logger: InstanceLogger,
    remove_container: bool,
    render_name: Option<String>,
    frame: Option<(FrameHandle, FrameOwnership)>,
    released: bool,
}

impl Teardown {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<InstanceRegistry>,
        frames: NamedFrameCache,
        cloner: Arc<dyn DocumentCloner>,
        id: InstanceId,
        logger: InstanceLogger,
        remove_container: bool,
        render_name: Option<String>,
    ) -> Self {
        Self {
            registry,
            frames,
            cloner,
            id,
            logger,
            remove_container,
            render_name,
            frame: None,
            released: false,
        }
    }

    /// Hand over the frame produced by duplication
    pub fn adopt(&mut self, frame: FrameHandle, ownership: FrameOwnership) {
        self.frame = Some((frame, ownership));
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Run the cleanup now
    pub fn finish(mut self) {
        self.release();
    }

    /// A named frame is persisted and never destroyed by the call that
    /// stored it. Otherwise an owned frame is destroyed when the caller
    /// asked for container removal. The instance is always released.
    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }

        if let Some((frame, ownership)) = self.frame.take() {
            match self.render_name.as_deref() {
                Some(name) => {
                    if frame.is_alive() {
                        self.logger.debug(format!("Storing frame {} as \"{}\"", frame.id(), name));
                        self.frames.store(name, frame);
                    }
                }
                None if ownership == FrameOwnership::Owned && self.remove_container => {
                    if !self.cloner.destroy_frame(&frame) {
                        self.logger
                            .warn("Cannot detach cloned frame as it is not in the DOM anymore");
                    } else {
                        self.logger.debug(format!("Cleaned up frame {}", frame.id()));
                    }
                }
                None => {}
            }
        }

        self.registry.release(self.id);
        self.logger.debug("Finished");
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::DomCloner;
    use crate::config::ResourceOptions;
    use crate::dom::{Document, Window};
    use crate::resource::NoopFetcher;

    struct Fixture {
        registry: Arc<InstanceRegistry>,
        frames: NamedFrameCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self { registry: Arc::new(InstanceRegistry::new()), frames: NamedFrameCache::new() }
        }

        fn teardown(&self, remove_container: bool, name: Option<&str>) -> Teardown {
            let instance = self.registry.register(false, &ResourceOptions::default(), None, None, Arc::new(NoopFetcher));
            Teardown::new(
                self.registry.clone(),
                self.frames.clone(),
                Arc::new(DomCloner),
                instance.id,
                instance.logger,
                remove_container,
                name.map(str::to_string),
            )
        }
    }

    fn frame() -> FrameHandle {
        FrameHandle::new(Document::new(), Window::default())
    }

    #[test]
    fn owned_frame_is_destroyed() {
        let fx = Fixture::new();
        let mut td = fx.teardown(true, None);
        let f = frame();
        td.adopt(f.clone(), FrameOwnership::Owned);
        td.finish();
        assert!(!f.is_alive());
        assert_eq!(fx.registry.active(), 0);
    }

    #[test]
    fn frame_survives_without_remove_container() {
        let fx = Fixture::new();
        let mut td = fx.teardown(false, None);
        let f = frame();
        td.adopt(f.clone(), FrameOwnership::Owned);
        td.finish();
        assert!(f.is_alive());
        assert_eq!(fx.registry.active(), 0);
    }

    #[test]
    fn named_frame_is_persisted_not_destroyed() {
        let fx = Fixture::new();
        let mut td = fx.teardown(true, Some("card"));
        let f = frame();
        td.adopt(f.clone(), FrameOwnership::Owned);
        td.finish();
        assert!(f.is_alive());
        assert!(fx.frames.lookup("card").unwrap().same_frame(&f));
    }

    #[test]
    fn borrowed_frame_is_never_destroyed() {
        let fx = Fixture::new();
        let mut td = fx.teardown(true, None);
        let f = frame();
        td.adopt(f.clone(), FrameOwnership::Borrowed);
        drop(td);
        assert!(f.is_alive());
    }

    #[test]
    fn drop_releases_instance_without_frame() {
        let fx = Fixture::new();
        let td = fx.teardown(true, Some("x"));
        assert_eq!(fx.registry.active(), 1);
        drop(td);
        assert_eq!(fx.registry.active(), 0);
        assert!(fx.frames.is_empty());
    }

    #[test]
    fn already_detached_frame_only_warns() {
        let fx = Fixture::new();
        let mut td = fx.teardown(true, None);
        let f = frame();
        f.detach();
        td.adopt(f, FrameOwnership::Owned);
        td.finish();
        assert_eq!(fx.registry.active(), 0);
    }
}
