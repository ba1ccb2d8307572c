//! Resting place for [SizeEstimator]

use super::measure::{Category, Identity, Measure, Shape};
use std::collections::HashSet;


/// Computes the deep memory footprint of values exposing the [Measure] capability.\
/// Each value is counted at most once per [Self::estimate()] call, so shared references and
/// cycles (`Rc<RefCell<_>>` loops) are accounted for a single time and never recursed forever.
#[derive(Debug, Default, Clone, Copy)]
pub struct SizeEstimator;

impl SizeEstimator {

    pub fn new() -> Self {
        Self
    }

    /// Returns the number of bytes taken by `value` and by every interesting value reachable from it.
    /// Never fails: broken native byte length probes fall back to the generic sizes.
    pub fn estimate(&self, value: &dyn Measure) -> usize {
        let mut walk = Walk::default();
        walk.visited.insert(value.identity());
        match walk.probe(value) {
            Some(bytes) => bytes,
            None        => value.inline_size() + walk.contents(value),
        }
    }
}

/// The state of one [SizeEstimator::estimate()] call
#[derive(Default)]
struct Walk {
    visited: HashSet<Identity>,
}

impl Walk {

    fn probe(&self, value: &dyn Measure) -> Option<usize> {
        match value.native_byte_len()? {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::trace!("falling back to the generic size of a {}: {}", value.category(), err);
                None
            },
        }
    }

    /// Footprint a referent adds to its owner -- its inline bytes already live inside the owner's storage
    fn referent(&mut self, value: &dyn Measure) -> usize {
        let category = value.category();
        if !category.is_interesting() {
            return 0
        }
        // scalars are uniquely owned: only the pointers leading to them may be shared
        if category != Category::Scalar && !self.visited.insert(value.identity()) {
            return 0
        }
        match self.probe(value) {
            Some(bytes) => bytes.saturating_sub(value.inline_size()),
            None        => self.contents(value),
        }
    }

    /// Directly owned heap + whatever the referents add -- scalars are never traversed
    fn contents(&mut self, value: &dyn Measure) -> usize {
        let owned = value.owned_heap_size();
        if value.category() == Category::Scalar {
            return owned
        }
        let mut referents = 0;
        match value.shape() {
            Shape::Atomic   => (),
            Shape::Fields   => value.visit_fields(&mut |_name, referent| referents += self.referent(referent)),
            Shape::Elements => value.visit_elements(&mut |referent| referents += self.referent(referent)),
        }
        owned + referents
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [estimator](super) module

    use super::*;
    use crate::size_estimator::ProbeError;
    use crate::measure_fields;
    use std::{
        cell::RefCell,
        collections::HashMap,
        mem::size_of,
        rc::Rc,
    };
    use rand::{Rng, SeedableRng, rngs::StdRng};


    /// shallow sizes of scalars are returned as is
    #[test]
    fn scalars() {
        let estimator = SizeEstimator::new();
        assert_eq!(estimator.estimate(&42i64),  size_of::<i64>(), "integers");
        assert_eq!(estimator.estimate(&2.5f64), size_of::<f64>(), "floats");
        let text = String::with_capacity(64);
        assert_eq!(estimator.estimate(&text), size_of::<String>() + 64, "strings count their buffers");
    }

    #[test]
    fn vector_of_numbers() {
        let estimator = SizeEstimator::new();
        let numbers: Vec<u32> = (0..1000).collect();
        assert_eq!(estimator.estimate(&numbers), size_of::<Vec<u32>>() + numbers.capacity() * size_of::<u32>());
    }

    #[test]
    fn nested_collections() {
        let estimator = SizeEstimator::new();
        let words = vec![String::with_capacity(10), String::with_capacity(20)];
        let expected = size_of::<Vec<String>>() + words.capacity() * size_of::<String>() + 10 + 20;
        assert_eq!(estimator.estimate(&words), expected, "element strings must have their buffers attributed to the vector");
    }

    #[test]
    fn shared_values_are_counted_once() {
        let estimator = SizeEstimator::new();
        let shared = Rc::new(vec![0u64; 128]);
        let pair = vec![Rc::clone(&shared), Rc::clone(&shared)];
        let rc_allocation = 2 * size_of::<usize>() + size_of::<Vec<u64>>();
        let expected = size_of::<Vec<Rc<Vec<u64>>>>() + pair.capacity() * size_of::<Rc<Vec<u64>>>()
                     + rc_allocation + shared.capacity() * size_of::<u64>();
        assert_eq!(estimator.estimate(&pair), expected);
    }

    struct Node {
        label: String,
        next:  RefCell<Option<Rc<Node>>>,
    }
    measure_fields!(Node { label, next });

    #[test]
    fn self_referencing_cycle_terminates() {
        let estimator = SizeEstimator::new();
        let node = Rc::new(Node { label: String::with_capacity(5), next: RefCell::new(None) });
        *node.next.borrow_mut() = Some(Rc::clone(&node));
        let expected = size_of::<Rc<Node>>() + 2 * size_of::<usize>() + size_of::<Node>() + 5;
        assert_eq!(estimator.estimate(&node), expected, "the node must be counted exactly once");
        node.next.borrow_mut().take();
    }

    /// the node must be counted once whether the walk starts at the node or at a pointer to it
    #[test]
    fn cycles_entered_at_the_pointee() {
        let estimator = SizeEstimator::new();
        let node = Rc::new(Node { label: String::with_capacity(5), next: RefCell::new(None) });
        *node.next.borrow_mut() = Some(Rc::clone(&node));
        let from_pointee = estimator.estimate(&*node);
        assert_eq!(from_pointee, size_of::<Node>() + 5, "the pointer leading back to the node must add nothing");
        let from_pointer = estimator.estimate(&node);
        assert_eq!(from_pointer - from_pointee, size_of::<Rc<Node>>() + 2 * size_of::<usize>(),
                   "entering through the Rc adds only the pointer & its counters");
        node.next.borrow_mut().take();
    }

    #[test]
    fn mutual_references_terminate() {
        let estimator = SizeEstimator::new();
        let a = Rc::new(Node { label: String::with_capacity(3), next: RefCell::new(None) });
        let b = Rc::new(Node { label: String::with_capacity(7), next: RefCell::new(Some(Rc::clone(&a))) });
        *a.next.borrow_mut() = Some(Rc::clone(&b));
        let node_allocation = 2 * size_of::<usize>() + size_of::<Node>();
        let distinct_nodes = size_of::<Rc<Node>>() + 2 * node_allocation + 3 + 7;
        let observed = estimator.estimate(&a);
        assert_eq!(observed, distinct_nodes, "both nodes, once each");
        assert_eq!(estimator.estimate(&b), observed, "the estimate must not depend on where the cycle is entered");
        a.next.borrow_mut().take();
    }

    #[test]
    fn uninteresting_referents_are_skipped() {
        struct Holder {
            out:      std::io::Stdout,
            callback: fn() -> u32,
            missing:  Option<Vec<u8>>,
            data:     Vec<u8>,
        }
        measure_fields!(Holder { out, callback, missing, data });
        let estimator = SizeEstimator::new();
        let holder = Holder { out: std::io::stdout(), callback: || 1, missing: None, data: Vec::with_capacity(9) };
        assert_eq!(estimator.estimate(&holder), size_of::<Holder>() + 9);
    }

    /// values with a native byte length are not traversed
    #[test]
    fn native_byte_length() {
        struct Buffer {
            reported: Result<usize, String>,
            backing:  Vec<u8>,
        }
        impl Measure for Buffer {
            fn native_byte_len(&self) -> Option<Result<usize, ProbeError>> {
                Some(self.reported.clone().map_err(ProbeError))
            }
            fn shape(&self) -> Shape {
                Shape::Fields
            }
            fn visit_fields(&self, visitor: &mut dyn FnMut(&str, &dyn Measure)) {
                visitor("backing", &self.backing)
            }
        }
        let estimator = SizeEstimator::new();
        let reporting = Buffer { reported: Ok(4096), backing: Vec::with_capacity(16) };
        assert_eq!(estimator.estimate(&reporting), 4096, "the probe's value must be used as is");
        let failing = Buffer { reported: Err(String::from("unavailable")), backing: Vec::with_capacity(16) };
        assert_eq!(estimator.estimate(&failing), size_of::<Buffer>() + 16, "a failing probe must fall back to the generic sizes");
        let array = [0u64; 32];
        assert_eq!(estimator.estimate(&array), 256, "arrays report their element storage");
    }

    #[test]
    fn maps_count_keys_and_values() {
        let estimator = SizeEstimator::new();
        let mut table: HashMap<String, Vec<u8>> = HashMap::with_capacity(3);
        table.insert(String::from("keys"), Vec::with_capacity(100));
        table.insert(String::from("values"), Vec::with_capacity(200));
        let slots = table.capacity() * (size_of::<String>() + size_of::<Vec<u8>>() + 1);
        let keys: usize = table.keys().map(String::capacity).sum();
        assert_eq!(estimator.estimate(&table), size_of::<HashMap<String, Vec<u8>>>() + slots + keys + 100 + 200);
    }

    /// random acyclic trees: the estimate must be the sum of every node's own size, each counted once
    #[test]
    fn random_acyclic_trees() {

        struct Tree {
            payload:  Vec<u64>,
            children: Vec<Tree>,
        }
        measure_fields!(Tree { payload, children });

        fn grow(rng: &mut StdRng, depth: u32) -> Tree {
            let payload = Vec::with_capacity(rng.gen_range(0..64));
            let children = if depth == 0 { vec![] } else { (0..rng.gen_range(0..4)).map(|_| grow(rng, depth - 1)).collect() };
            Tree { payload, children }
        }

        /// heap owned by `tree` and its descendants -- the inline part of each tree lives in its parent's buffer
        fn expected_heap(tree: &Tree) -> usize {
            tree.payload.capacity() * size_of::<u64>()
                + tree.children.capacity() * size_of::<Tree>()
                + tree.children.iter().map(expected_heap).sum::<usize>()
        }

        let estimator = SizeEstimator::new();
        let mut rng = StdRng::seed_from_u64(0x6d656d70726f66);
        for _ in 0..32 {
            let tree = grow(&mut rng, 4);
            assert_eq!(estimator.estimate(&tree), size_of::<Tree>() + expected_heap(&tree));
        }
    }
}
