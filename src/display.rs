use crate::processing::transition::TransitionFrame;

/// Receives frames from the scheduler. `present` is called inline on the
/// scheduler task, in ratio order, and must return promptly.
pub trait DisplaySurface: Send + 'static {
    fn present(&mut self, frame: &TransitionFrame);
}

impl<F> DisplaySurface for F
where
    F: FnMut(&TransitionFrame) + Send + 'static,
{
    fn present(&mut self, frame: &TransitionFrame) {
        self(frame)
    }
}

/// Surface that drops every frame; used when nobody is watching.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl DisplaySurface for NullSurface {
    fn present(&mut self, _frame: &TransitionFrame) {}
}
