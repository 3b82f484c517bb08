//! Zipper stage: pairs two differently typed inputs by association token.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::marker::PhantomData;

use either::Either;

use super::StageLogic;

/// Assigns association tokens to the inputs of either side.
pub trait Association<L, R>: Send + 'static {
    type Token: Eq + Hash + Send + 'static;

    fn left_token(&mut self, left: &L) -> Self::Token;

    fn right_token(&mut self, right: &R) -> Self::Token;
}

/// Strict FIFO pairing: the n-th left input meets the n-th right input.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sequential {
    left: u64,
    right: u64,
}

impl<L, R> Association<L, R> for Sequential {
    type Token = u64;

    fn left_token(&mut self, _left: &L) -> u64 {
        let token = self.left;
        self.left = self.left.wrapping_add(1);
        token
    }

    fn right_token(&mut self, _right: &R) -> u64 {
        let token = self.right;
        self.right = self.right.wrapping_add(1);
        token
    }
}

/// Pairing by a key derived from each side.
pub struct ByKey<FL, FR, K> {
    left: FL,
    right: FR,
    _key: PhantomData<fn() -> K>,
}

impl<FL, FR, K> ByKey<FL, FR, K> {
    pub const fn new(left: FL, right: FR) -> Self {
        Self {
            left,
            right,
            _key: PhantomData,
        }
    }
}

impl<L, R, K, FL, FR> Association<L, R> for ByKey<FL, FR, K>
where
    K: Eq + Hash + Send + 'static,
    FL: Fn(&L) -> K + Send + 'static,
    FR: Fn(&R) -> K + Send + 'static,
{
    type Token = K;

    fn left_token(&mut self, left: &L) -> K {
        (self.left)(left)
    }

    fn right_token(&mut self, right: &R) -> K {
        (self.right)(right)
    }
}

/// Buffers both sides until tokens match, then emits the pair.
///
/// Unmatched entries stay buffered indefinitely; [`Zipper::buffered`]
/// reports how many are waiting on each side.
pub struct Zipper<L, R, A: Association<L, R>> {
    name: String,
    association: A,
    lefts: HashMap<A::Token, VecDeque<L>>,
    rights: HashMap<A::Token, VecDeque<R>>,
}

impl<L, R> Zipper<L, R, Sequential> {
    /// A zipper pairing inputs in arrival order.
    pub fn sequential(name: impl Into<String>) -> Self {
        Self::new(name, Sequential::default())
    }
}

impl<L, R, A: Association<L, R>> Zipper<L, R, A> {
    pub fn new(name: impl Into<String>, association: A) -> Self {
        Self {
            name: name.into(),
            association,
            lefts: HashMap::new(),
            rights: HashMap::new(),
        }
    }

    /// Entries waiting for a partner, as `(left, right)`.
    pub fn buffered(&self) -> (usize, usize) {
        (
            self.lefts.values().map(VecDeque::len).sum(),
            self.rights.values().map(VecDeque::len).sum(),
        )
    }

    fn push_left(&mut self, left: L) -> Option<(L, R)> {
        let token = self.association.left_token(&left);
        match take_front(&mut self.rights, &token) {
            Some(right) => Some((left, right)),
            None => {
                self.lefts.entry(token).or_default().push_back(left);
                None
            }
        }
    }

    fn push_right(&mut self, right: R) -> Option<(L, R)> {
        let token = self.association.right_token(&right);
        match take_front(&mut self.lefts, &token) {
            Some(left) => Some((left, right)),
            None => {
                self.rights.entry(token).or_default().push_back(right);
                None
            }
        }
    }
}

fn take_front<K: Eq + Hash, V>(buffers: &mut HashMap<K, VecDeque<V>>, token: &K) -> Option<V> {
    let queue = buffers.get_mut(token)?;
    let front = queue.pop_front();
    if queue.is_empty() {
        buffers.remove(token);
    }
    front
}

impl<L, R, A> StageLogic<Either<L, R>, (L, R)> for Zipper<L, R, A>
where
    L: Send + 'static,
    R: Send + 'static,
    A: Association<L, R>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: Either<L, R>) -> Vec<(L, R)> {
        let paired = match input {
            Either::Left(left) => self.push_left(left),
            Either::Right(right) => self.push_right(right),
        };
        paired.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn given_two_lefts_and_one_right_then_first_pair_emits_and_second_left_waits() {
        let mut zipper = Zipper::<&str, &str, _>::sequential("zip");

        assert!(zipper.process(Either::Left("left0")).is_empty());
        assert!(zipper.process(Either::Left("left1")).is_empty());
        let pairs = zipper.process(Either::Right("right0"));

        assert_eq!(pairs, vec![("left0", "right0")]);
        assert_eq!(zipper.buffered(), (1, 0));
    }

    #[test]
    fn given_keyed_association_then_pairs_follow_keys_not_arrival() {
        let mut zipper = Zipper::<(u32, char), (u32, &str), _>::new(
            "by-id",
            ByKey::new(|l: &(u32, char)| l.0, |r: &(u32, &str)| r.0),
        );

        assert!(zipper.process(Either::Left((2, 'b'))).is_empty());
        assert!(zipper.process(Either::Left((1, 'a'))).is_empty());
        let pairs = zipper.process(Either::Right((1, "one")));

        assert_eq!(pairs, vec![((1, 'a'), (1, "one"))]);
        assert_eq!(zipper.buffered(), (1, 0));
    }

    #[test]
    fn given_unmatched_rights_then_they_are_never_evicted() {
        let mut zipper = Zipper::<u8, u8, _>::new("keyed", ByKey::new(|l: &u8| *l, |r: &u8| *r));
        for r in 0..50u8 {
            assert!(zipper.process(Either::Right(r)).is_empty());
        }
        assert_eq!(zipper.buffered(), (0, 50));
        assert_eq!(zipper.process(Either::Left(49)), vec![(49, 49)]);
    }

    proptest! {
        #[test]
        fn sequential_pairs_nth_left_with_nth_right(
            sides in prop::collection::vec(any::<bool>(), 0..100),
        ) {
            let mut zipper = Zipper::<usize, usize, _>::sequential("seq");
            let mut next_left = 0usize;
            let mut next_right = 0usize;
            let mut pairs = Vec::new();
            for is_left in &sides {
                let input = if *is_left {
                    next_left += 1;
                    Either::Left(next_left - 1)
                } else {
                    next_right += 1;
                    Either::Right(next_right - 1)
                };
                pairs.extend(zipper.process(input));
            }

            let matched = next_left.min(next_right);
            prop_assert_eq!(pairs.len(), matched);
            for (left, right) in &pairs {
                prop_assert_eq!(left, right);
            }
            prop_assert_eq!(zipper.buffered(), (next_left - matched, next_right - matched));
        }
    }
}
