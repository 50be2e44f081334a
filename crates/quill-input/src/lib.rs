//! Shared, lazily filled views over one input sequence.
//!
//! Every [`Cursor`] created from a [`Forker`] reads from the same append-only
//! buffer. Items are pulled from the underlying iterator at most once, no matter
//! how many cursors walk over them, and buffered items behind the slowest live
//! cursor are released.

use std::cell::RefCell;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

struct Buffer<T> {
    source: Option<Box<dyn Iterator<Item = T>>>,
    items: VecDeque<T>,
    /// Absolute position of `items[0]`.
    base: usize,
    /// Live cursors per absolute position.
    holds: BTreeMap<usize, usize>,
}

impl<T> Buffer<T> {
    fn end(&self) -> usize {
        self.base + self.items.len()
    }

    fn fill(&mut self, upto: usize) {
        while self.end() < upto {
            let Some(source) = self.source.as_mut() else { return };
            match source.next() {
                Some(item) => self.items.push_back(item),
                None => {
                    log::trace!("input exhausted after {} items", self.end());
                    self.source = None;
                }
            }
        }
    }

    fn get(&self, position: usize) -> Option<&T> {
        position.checked_sub(self.base).and_then(|index| self.items.get(index))
    }

    fn hold(&mut self, position: usize) {
        *self.holds.entry(position).or_default() += 1;
    }

    fn release(&mut self, position: usize) {
        if let Entry::Occupied(mut entry) = self.holds.entry(position) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
        self.trim();
    }

    fn trim(&mut self) {
        match self.holds.keys().next() {
            Some(&lowest) => {
                while self.base < lowest && self.items.pop_front().is_some() {
                    self.base += 1;
                }
            }
            None => {
                self.source = None;
                self.items.clear();
            }
        }
    }
}

/// Owner of a shared input buffer, before any cursor exists.
pub struct Forker<T> {
    buffer: Rc<RefCell<Buffer<T>>>,
}

impl<T: Clone + 'static> Forker<T> {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let buffer = Buffer {
            source: Some(Box::new(items.into_iter())),
            items: VecDeque::new(),
            base: 0,
            holds: BTreeMap::new(),
        };
        Self { buffer: Rc::new(RefCell::new(buffer)) }
    }

    /// The first cursor, positioned at the start of the sequence.
    pub fn into_cursor(self) -> Cursor<T> {
        self.buffer.borrow_mut().hold(0);
        Cursor { buffer: self.buffer, position: 0 }
    }
}

/// A position in a shared input buffer.
///
/// Cursors are not `Clone`: a second view is made with [`Cursor::fork`], and a
/// fork that should win is folded back with [`Cursor::accept`]. Dropping a
/// cursor releases its hold on the buffer.
pub struct Cursor<T> {
    buffer: Rc<RefCell<Buffer<T>>>,
    position: usize,
}

impl<T: Clone + 'static> Cursor<T> {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Forker::new(items).into_cursor()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn peek(&self) -> Option<T> {
        self.peek_nth(0)
    }

    pub fn peek_nth(&self, n: usize) -> Option<T> {
        let at = self.position + n;
        let mut buffer = self.buffer.borrow_mut();
        buffer.fill(at + 1);
        buffer.get(at).cloned()
    }

    pub fn is_done(&self) -> bool {
        let mut buffer = self.buffer.borrow_mut();
        buffer.fill(self.position + 1);
        buffer.end() <= self.position
    }

    /// Moves forward by up to `n` items and returns how many were passed.
    pub fn advance(&mut self, n: usize) -> usize {
        let target = {
            let mut buffer = self.buffer.borrow_mut();
            buffer.fill(self.position + n);
            (self.position + n).min(buffer.end())
        };
        let moved = target - self.position;
        self.move_to(target);
        moved
    }

    /// A new cursor at the same position, sharing this cursor's buffer.
    pub fn fork(&self) -> Self {
        self.buffer.borrow_mut().hold(self.position);
        Self { buffer: Rc::clone(&self.buffer), position: self.position }
    }

    /// Takes over the position of `child`, a fork of the same buffer.
    /// A cursor over another input is dropped and `false` returned.
    pub fn accept(&mut self, child: Self) -> bool {
        if !self.same_source(&child) {
            return false;
        }
        self.move_to(child.position);
        true
    }

    pub fn reject(self) {}

    pub fn same_source(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.buffer, &other.buffer)
    }

    fn move_to(&mut self, target: usize) {
        if target == self.position {
            return;
        }
        let mut buffer = self.buffer.borrow_mut();
        buffer.hold(target);
        buffer.release(self.position);
        self.position = target;
    }
}

impl Cursor<char> {
    pub fn text(text: Rc<str>) -> Self {
        Self::new(Chars { text, offset: 0 })
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        self.buffer.borrow_mut().release(self.position);
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("position", &self.position).finish_non_exhaustive()
    }
}

struct Chars {
    text: Rc<str>,
    offset: usize,
}

impl Iterator for Chars {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        let c = self.text[self.offset..].chars().next()?;
        self.offset += c.len_utf8();
        Some(c)
    }
}
