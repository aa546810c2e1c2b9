//! Linear interpolation of fixed-point parameters in rendering loops.

/// Ramps a value from its previous block's setting to a new one over one block.
///
/// Keeps a mutable reference to the stored value and writes the new value back on drop,
/// so the next block starts where this one was heading.
#[derive(Debug)]
pub struct ParameterInterpolator<'a> {
    state: &'a mut i32,
    value: i32,
    target: i32,
    increment: i32,
}

impl<'a> ParameterInterpolator<'a> {
    pub fn new(state: &'a mut i32, new_value: i32, size: usize) -> Self {
        let v = *state;
        let increment = if size == 0 {
            0
        } else {
            ((new_value as i64 - v as i64) / size as i64) as i32
        };
        Self {
            state,
            value: v,
            target: new_value,
            increment,
        }
    }

    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> i32 {
        self.value = self.value.wrapping_add(self.increment);
        self.value
    }
}

impl Drop for ParameterInterpolator<'_> {
    fn drop(&mut self) {
        *self.state = self.target;
    }
}
