//! Filter stage: forwards an input unchanged iff a predicate holds.

use super::StageLogic;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send>;

/// Forwards the inputs that satisfy a predicate.
pub struct Filter<T> {
    name: String,
    predicate: Predicate<T>,
}

impl<T> Filter<T> {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&T) -> bool + Send + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl<T: Send + 'static> StageLogic<T, T> for Filter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: T) -> Vec<T> {
        if (self.predicate)(&input) {
            vec![input]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_forward_only_matching_inputs_unchanged() {
        let mut even = Filter::new("even", |v: &u32| v % 2 == 0);
        let out: Vec<u32> = (1..=6).flat_map(|v| even.process(v)).collect();
        assert_eq!(out, vec![2, 4, 6]);
        assert_eq!(even.name(), "even");
    }
}
