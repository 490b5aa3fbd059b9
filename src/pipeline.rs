//! Stage composition.
//!
//! A [`Stage`] consumes a [`ProcessingState`] and yields the next one. A
//! [`Pipeline`] runs its stages strictly one after another; concurrency only
//! happens inside a stage.

use std::{borrow::Cow, future::Future};

use futures::{FutureExt as _, future::BoxFuture};
use tracing::{Instrument as _, error, info, info_span};

use crate::{Error, ProcessingState};

type StageFn = dyn Fn(ProcessingState) -> BoxFuture<'static, Result<ProcessingState, Error>>
    + Send
    + Sync;

pub struct Stage {
    name: Cow<'static, str>,
    run: Box<StageFn>,
}

impl Stage {
    pub fn new<F, Fut>(name: impl Into<Cow<'static, str>>, run: F) -> Self
    where
        F: Fn(ProcessingState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProcessingState, Error>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |state| run(state).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn apply(&self, state: ProcessingState) -> Result<ProcessingState, Error> {
        (self.run)(state).await
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}

#[derive(Default, Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn run(&self, mut state: ProcessingState) -> Result<ProcessingState, Error> {
        for (position, stage) in self.stages.iter().enumerate() {
            let span = info_span!("stage", name = stage.name(), position);
            state = async {
                info!(documents = state.documents().len(), "start");
                let state = stage
                    .apply(state)
                    .await
                    .inspect_err(|error| error!(%error, "stage failed"))?;
                info!(
                    documents = state.documents().len(),
                    assets = state.assets().len(),
                    "done"
                );
                Ok::<_, Error>(state)
            }
            .instrument(span)
            .await?;
        }
        Ok(state)
    }
}
