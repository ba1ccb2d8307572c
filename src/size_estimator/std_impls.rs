//! [Measure] implementations for the std types.
//!
//! Heap sizes are derived from capacities & element sizes -- allocator bookkeeping and
//! per-node overheads of tree based collections are not accounted for.

use super::measure::{Category, Identity, Measure, ProbeError, Shape};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    fs::File,
    io::{BufReader, BufWriter, Stderr, Stdin, Stdout, Write},
    mem::{size_of, size_of_val},
    ops::{Range, RangeInclusive},
    path::PathBuf,
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};


macro_rules! scalars {
    ($($type:ty),* $(,)?) => {
        $(
            impl Measure for $type {
                fn category(&self) -> Category {
                    Category::Scalar
                }
            }
        )*
    };
}
scalars!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, Duration, Instant);

impl Measure for str {
    fn category(&self) -> Category {
        Category::Scalar
    }
}

impl Measure for String {
    fn category(&self) -> Category {
        Category::Scalar
    }
    fn owned_heap_size(&self) -> usize {
        self.capacity()
    }
}

impl Measure for PathBuf {
    fn category(&self) -> Category {
        Category::Scalar
    }
    fn owned_heap_size(&self) -> usize {
        self.capacity()
    }
}


// smart pointers & cells
/////////////////////////

impl<T: Measure + ?Sized> Measure for Box<T> {
    fn owned_heap_size(&self) -> usize {
        size_of_val(&**self)
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        visit_unsized(&**self, visitor)
    }
}

/// Shared pointers stand for their pointee: they take its identity, so reaching the same allocation
/// through the value itself or through any of its pointers counts it once, and they enumerate its
/// referents directly instead of presenting the pointee as a referent of its own.
macro_rules! shared_pointers {
    ($($pointer:ident),* $(,)?) => {
        $(
            impl<T: Measure + ?Sized> Measure for $pointer<T> {
                fn owned_heap_size(&self) -> usize {
                    // strong & weak counters share the allocation with the value
                    2 * size_of::<usize>() + size_of_val(&**self) + (**self).owned_heap_size()
                }
                fn shape(&self) -> Shape {
                    (**self).shape()
                }
                fn visit_fields(&self, visitor: &mut dyn FnMut(&str, &dyn Measure)) {
                    (**self).visit_fields(visitor)
                }
                fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
                    (**self).visit_elements(visitor)
                }
                fn identity(&self) -> Identity {
                    (**self).identity()
                }
            }
        )*
    };
}
shared_pointers!(Rc, Arc);

impl<T: Measure> Measure for RefCell<T> {
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        // a cell currently borrowed for writing is left opaque
        if let Ok(inner) = self.try_borrow() {
            visitor(&*inner)
        }
    }
}

impl<T: Measure> Measure for Option<T> {
    fn category(&self) -> Category {
        match self {
            Some(_) => Category::Composite,
            None    => Category::Null,
        }
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        if let Some(inner) = self {
            visitor(inner)
        }
    }
}

/// `&dyn Measure` can't be built from an unsized `&T` -- `str` and `[T]` need to be special-cased
fn visit_unsized<T: Measure + ?Sized>(value: &T, visitor: &mut dyn FnMut(&dyn Measure)) {
    struct Unsized<'a, T: ?Sized>(&'a T);
    impl<T: Measure + ?Sized> Measure for Unsized<'_, T> {
        fn category(&self) -> Category {
            self.0.category()
        }
        fn native_byte_len(&self) -> Option<Result<usize, ProbeError>> {
            self.0.native_byte_len()
        }
        fn inline_size(&self) -> usize {
            self.0.inline_size()
        }
        fn owned_heap_size(&self) -> usize {
            self.0.owned_heap_size()
        }
        fn shape(&self) -> Shape {
            self.0.shape()
        }
        fn visit_fields(&self, visitor: &mut dyn FnMut(&str, &dyn Measure)) {
            self.0.visit_fields(visitor)
        }
        fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
            self.0.visit_elements(visitor)
        }
        fn identity(&self) -> Identity {
            self.0.identity()
        }
    }
    visitor(&Unsized(value))
}


// sequences & collections
//////////////////////////

impl<T: Measure> Measure for [T] {
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        self.iter().for_each(|element| visitor(element))
    }
}

/// arrays are raw element storage: they report their own byte length and are not traversed
impl<T: Measure, const N: usize> Measure for [T; N] {
    fn native_byte_len(&self) -> Option<Result<usize, ProbeError>> {
        Some(Ok(size_of::<[T; N]>()))
    }
}

impl<T: Measure> Measure for Vec<T> {
    fn owned_heap_size(&self) -> usize {
        self.capacity() * size_of::<T>()
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        self.iter().for_each(|element| visitor(element))
    }
}

impl<T: Measure> Measure for VecDeque<T> {
    fn owned_heap_size(&self) -> usize {
        self.capacity() * size_of::<T>()
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        self.iter().for_each(|element| visitor(element))
    }
}

impl<K: Measure, V: Measure, S> Measure for HashMap<K, V, S> {
    fn owned_heap_size(&self) -> usize {
        // one control byte per slot
        self.capacity() * (size_of::<K>() + size_of::<V>() + 1)
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        for (key, value) in self {
            visitor(key);
            visitor(value);
        }
    }
}

impl<T: Measure, S> Measure for HashSet<T, S> {
    fn owned_heap_size(&self) -> usize {
        self.capacity() * (size_of::<T>() + 1)
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        self.iter().for_each(|member| visitor(member))
    }
}

impl<K: Measure, V: Measure> Measure for BTreeMap<K, V> {
    fn owned_heap_size(&self) -> usize {
        self.len() * (size_of::<K>() + size_of::<V>())
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        for (key, value) in self {
            visitor(key);
            visitor(value);
        }
    }
}

impl<T: Measure> Measure for BTreeSet<T> {
    fn owned_heap_size(&self) -> usize {
        self.len() * size_of::<T>()
    }
    fn shape(&self) -> Shape {
        Shape::Elements
    }
    fn visit_elements(&self, visitor: &mut dyn FnMut(&dyn Measure)) {
        self.iter().for_each(|member| visitor(member))
    }
}

macro_rules! tuples {
    ($(($($name:ident : $index:tt),+)),* $(,)?) => {
        $(
            impl<$($name: Measure),+> Measure for ($($name,)+) {
                fn shape(&self) -> Shape {
                    Shape::Fields
                }
                fn visit_fields(&self, visitor: &mut dyn FnMut(&str, &dyn Measure)) {
                    $( visitor(stringify!($index), &self.$index); )+
                }
            }
        )*
    };
}
tuples!((A: 0, B: 1), (A: 0, B: 1, C: 2), (A: 0, B: 1, C: 2, D: 3));


// never measured
/////////////////

macro_rules! uninteresting {
    ($category:expr => $($type:ty),* $(,)?) => {
        $(
            impl Measure for $type {
                fn category(&self) -> Category {
                    $category
                }
            }
        )*
    };
}
uninteresting!(Category::Stream => File, Stdin, Stdout, Stderr);
uninteresting!(Category::Null   => ());

impl<R> Measure for BufReader<R> {
    fn category(&self) -> Category {
        Category::Stream
    }
}

impl<W: Write> Measure for BufWriter<W> {
    fn category(&self) -> Category {
        Category::Stream
    }
}

impl<T> Measure for Range<T> {
    fn category(&self) -> Category {
        Category::Generator
    }
}

impl<T> Measure for RangeInclusive<T> {
    fn category(&self) -> Category {
        Category::Generator
    }
}

macro_rules! callables {
    ($(($($arg:ident),*)),* $(,)?) => {
        $(
            impl<Ret, $($arg),*> Measure for fn($($arg),*) -> Ret {
                fn category(&self) -> Category {
                    Category::Callable
                }
            }
        )*
    };
}
callables!((), (A), (A, B), (A, B, C));


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [std_impls](super) module

    use super::*;


    #[test]
    fn categories() {
        assert_eq!(17u64.category(),                          Category::Scalar);
        assert_eq!(String::from("text").category(),           Category::Scalar);
        assert_eq!(vec![1u8].category(),                      Category::Composite);
        assert_eq!(None::<u32>.category(),                    Category::Null);
        assert_eq!(Some(3u32).category(),                     Category::Composite);
        assert_eq!((0..10).category(),                        Category::Generator);
        assert_eq!(std::io::stdout().category(),              Category::Stream);
        let callable: fn(u32) -> u32 = |n| n + 1;
        assert_eq!(callable.category(),                       Category::Callable);
    }

    #[test]
    fn heap_sizes() {
        let vec = Vec::<u64>::with_capacity(100);
        assert_eq!(vec.owned_heap_size(), 800, "vectors own `capacity` element slots");
        let string = String::with_capacity(33);
        assert_eq!(string.owned_heap_size(), 33, "strings own `capacity` bytes");
        let boxed = Box::new([0u8; 40]);
        assert_eq!(boxed.owned_heap_size(), 40, "a box owns the allocation of its content");
        let shared = Rc::new(7u64);
        assert_eq!(shared.owned_heap_size(), 2 * size_of::<usize>() + 8, "Rc allocations hold two counters besides the value");
    }

    #[test]
    fn shared_pointer_identity() {
        let first = Rc::new(vec![1, 2, 3]);
        let second = Rc::clone(&first);
        assert_eq!(first.identity(), second.identity(), "clones of the same Rc must share an identity");
        assert_eq!(first.identity(), (*first).identity(), "an Rc must be identified by its pointee");
        let other = Rc::new(vec![1, 2, 3]);
        assert_ne!(first.identity(), other.identity(), "distinct allocations must have distinct identities");
        let shared = Arc::new(String::from("shared"));
        assert_eq!(shared.identity(), (*shared).identity(), "the same goes for Arc");
    }

    #[test]
    fn struct_and_first_field_differ() {
        struct Wrapper {
            inner: Vec<u8>,
        }
        let wrapper = Wrapper { inner: vec![] };
        assert_ne!(Identity::of(&wrapper), Identity::of(&wrapper.inner), "same address, different types -- must be different identities");
    }

    #[test]
    fn borrowed_refcell_is_opaque() {
        let cell = RefCell::new(vec![String::from("x")]);
        let _writer = cell.borrow_mut();
        let mut visited = 0;
        cell.visit_elements(&mut |_| visited += 1);
        assert_eq!(visited, 0, "a mutably borrowed cell must not be visited");
    }
}
