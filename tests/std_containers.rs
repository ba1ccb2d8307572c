//! Applies the size estimator to some of Rust's std lib containers, attesting their estimates grow linearly with their contents

use memprof::SizeEstimator;
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, VecDeque},
    mem::size_of,
    rc::Rc,
};


/// Asserts `build(n)` is estimated as `fixed + n * per_element`, for a few `n`s
fn assert_linear<T: memprof::Measure>(container: &str, fixed: usize, per_element: usize, build: impl Fn(usize) -> T) {
    let estimator = SizeEstimator::new();
    for n in [0, 1, 10, 1000] {
        let observed = estimator.estimate(&build(n));
        assert_eq!(observed, fixed + n * per_element, "{container} with {n} elements");
    }
}

#[test]
fn vec_of_numbers() {
    assert_linear("Vec<u32>", size_of::<Vec<u32>>(), size_of::<u32>(), |n| {
        let mut vec = Vec::<u32>::with_capacity(n);
        vec.extend(0..n as u32);
        vec
    });
}

#[test]
fn vec_deque_of_numbers() {
    let estimator = SizeEstimator::new();
    let mut deque = VecDeque::<u64>::with_capacity(100);
    deque.extend(0..100);
    let observed = estimator.estimate(&deque);
    assert_eq!(observed, size_of::<VecDeque<u64>>() + deque.capacity() * size_of::<u64>());
}

#[test]
fn vec_of_strings() {
    // each string has its own buffer: 4 bytes for "item"
    assert_linear("Vec<String>", size_of::<Vec<String>>(), size_of::<String>() + 4, |n| {
        let mut vec = Vec::<String>::with_capacity(n);
        vec.extend((0..n).map(|_| String::from("item")));
        vec
    });
}

#[test]
fn btree_map() {
    assert_linear("BTreeMap<u32, u64>", size_of::<BTreeMap<u32, u64>>(), size_of::<u32>() + size_of::<u64>(), |n| {
        (0..n as u32).map(|key| (key, key as u64)).collect::<BTreeMap<_, _>>()
    });
}

#[test]
fn hash_map_follows_its_capacity() {
    let estimator = SizeEstimator::new();
    let mut map = HashMap::<u32, u32>::new();
    let mut previous = estimator.estimate(&map);
    for key in 0..1000 {
        map.insert(key, key);
        let observed = estimator.estimate(&map);
        assert!(observed >= previous, "maps never shrink by themselves");
        assert_eq!(observed, size_of::<HashMap<u32, u32>>() + map.capacity() * (2 * size_of::<u32>() + 1));
        previous = observed;
    }
}

#[test]
fn shared_buffers_are_counted_once() {
    let estimator = SizeEstimator::new();
    let buffer = Rc::new(vec![0u8; 4096]);
    let views: Vec<Rc<Vec<u8>>> = (0..10).map(|_| Rc::clone(&buffer)).collect();
    let observed = estimator.estimate(&views);
    let one_buffer = 2 * size_of::<usize>() + size_of::<Vec<u8>>() + 4096;
    assert_eq!(observed, size_of::<Vec<Rc<Vec<u8>>>>() + views.capacity() * size_of::<Rc<Vec<u8>>>() + one_buffer);
}

#[test]
fn interior_mutability() {
    let estimator = SizeEstimator::new();
    let cell = RefCell::new(vec![0u16; 64]);
    let expected = size_of::<RefCell<Vec<u16>>>() + 64 * size_of::<u16>();
    assert_eq!(estimator.estimate(&cell), expected);
    cell.borrow_mut().extend([1u16; 64]);
    assert!(estimator.estimate(&cell) > expected, "the estimate must follow the contents");
}
