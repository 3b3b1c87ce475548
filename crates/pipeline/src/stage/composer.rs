use crate::stage::{IdentityStage, Stage};

pub struct StageComposer<S1, S2> {
    stage_1: S1,
    stage_2: S2,
}

impl<S1, S2> StageComposer<S1, S2> {
    pub fn new(stage_1: S1, stage_2: S2) -> Self {
        Self { stage_1, stage_2 }
    }
}

impl Default for StageComposer<IdentityStage, IdentityStage> {
    fn default() -> Self {
        Self::new(IdentityStage, IdentityStage)
    }
}

impl<In, S1, S2> Stage<In> for StageComposer<S1, S2>
where
    S1: Stage<In>,
    S2: Stage<S1::Out>,
{
    type Out = S2::Out;

    fn apply(&self, inner: In) -> Self::Out {
        let out_1 = self.stage_1.apply(inner);
        self.stage_2.apply(out_1)
    }
}
