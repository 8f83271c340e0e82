use std::marker::PhantomData;
use tracing::{error, warn};

use crate::error::SdResult;
use crate::objects::{ObjectList, TargetObject};
use crate::types::{Action, WatchEvent};
use crate::watchers::{KindHandler, WatcherContext};

/// Watch handler for the roles whose targets are built from a single object
/// kind: pod, node, service and ingress.
pub struct TargetsHandler<T> {
    ctx: WatcherContext,
    _kind: PhantomData<fn() -> T>,
}

impl<T: TargetObject> TargetsHandler<T> {
    pub fn new(ctx: WatcherContext) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }

    async fn process(&self, object: T, action: &Action) {
        let key = object.object_key();
        match action {
            Action::Added | Action::Modified => {
                let labels = object.target_labels();
                self.ctx.emit(T::KIND, &key, Some(labels)).await;
            }
            Action::Deleted => self.ctx.emit(T::KIND, &key, None).await,
            Action::Bookmark => {}
            Action::Error => {
                warn!(kind = T::KIND, "received an error frame, the stream will restart");
            }
            Action::Unknown(other) => {
                warn!(kind = T::KIND, action = %other, "unexpected watch action");
            }
        }
    }
}

impl<T> Clone for TargetsHandler<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: TargetObject> KindHandler for TargetsHandler<T> {
    async fn bootstrap(&self, body: &[u8]) -> SdResult<String> {
        let list = ObjectList::<T>::parse(body)?;
        for object in list.items {
            self.process(object, &Action::Added).await;
        }
        Ok(list.metadata.resource_version)
    }

    async fn handle_event(&self, event: WatchEvent) {
        let object: T = match serde_json::from_str(event.object.get()) {
            Ok(object) => object,
            Err(err) => {
                error!(kind = T::KIND, "cannot decode watch object, skipping it: {err}");
                return;
            }
        };
        self.process(object, &event.action).await;
    }
}
