//! The decorator chain: stages wrap services into new services, composed by
//! ordinary function composition and folded once at pipeline construction.

mod composer;
mod identity;
mod stage_fn;

pub use composer::StageComposer;
pub use identity::IdentityStage;
pub use stage_fn::stage_fn;

/// A pipeline stage: wraps a service, yielding a new service.
pub trait Stage<In> {
    type Out;

    fn apply(&self, inner: In) -> Self::Out;
}

pub trait StageExt<In>: Stage<In> {
    /// the argument stage wraps outside `self`
    fn and_then<S>(self, stage: S) -> StageComposer<Self, S>
    where
        Self: Sized,
    {
        StageComposer::new(self, stage)
    }

    /// the argument stage wraps inside `self`
    fn compose<S>(self, stage: S) -> StageComposer<S, Self>
    where
        Self: Sized,
    {
        StageComposer::new(stage, self)
    }
}

impl<T: Stage<In> + ?Sized, In> StageExt<In> for T {}
