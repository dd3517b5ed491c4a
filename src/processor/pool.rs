//! Pool of reusable processors.
//!
//! The pool owns every processor it creates. Callers check out a handle,
//! borrow the processor through it and release it when done; released
//! processors are handed out again, least recently released first, before
//! a new one is created. Releasing does not touch the processor: its next
//! forward resets it.

use crate::error::{NetworkError, Result};
use std::collections::VecDeque;
use std::fmt;

/// Factory of pooled items, given the id of the item to create.
pub type ItemFactory<P> = Box<dyn FnMut(usize) -> Result<P> + Send>;

/// Arena of processors with an in-use flag per processor.
pub struct ProcessorsPool<P> {
    factory: ItemFactory<P>,
    items: Vec<P>,
    in_use: Vec<bool>,
    available: VecDeque<usize>,
}

impl<P> ProcessorsPool<P> {
    /// Empty pool creating its items with `factory`.
    pub fn new(factory: impl FnMut(usize) -> Result<P> + Send + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            items: Vec::new(),
            in_use: Vec::new(),
            available: VecDeque::new(),
        }
    }

    /// Check out an item, creating one when none is available.
    ///
    /// The handle is also the id the item was created with.
    pub fn get_item(&mut self) -> Result<usize> {
        let handle = match self.available.pop_front() {
            Some(handle) => handle,
            None => {
                let handle = self.items.len();
                self.items.push((self.factory)(handle)?);
                self.in_use.push(false);
                log::debug!("Processors pool grown to {} items", self.items.len());
                handle
            }
        };
        self.in_use[handle] = true;
        Ok(handle)
    }

    /// Give `handle` back to the pool.
    pub fn release_item(&mut self, handle: usize) -> Result<()> {
        match self.in_use.get_mut(handle) {
            Some(in_use) if *in_use => {
                *in_use = false;
                self.available.push_back(handle);
                Ok(())
            }
            Some(_) => Err(NetworkError::pool(format!(
                "Item {} is not checked out",
                handle
            ))),
            None => Err(NetworkError::pool(format!(
                "Item {} does not belong to this pool of {} items",
                handle,
                self.items.len()
            ))),
        }
    }

    /// Release every item; they are handed out again in creation order.
    pub fn release_all(&mut self) {
        self.in_use.iter_mut().for_each(|in_use| *in_use = false);
        self.available = (0..self.items.len()).collect();
    }

    /// Item behind `handle`.
    pub fn get(&self, handle: usize) -> Result<&P> {
        self.items
            .get(handle)
            .ok_or_else(|| NetworkError::pool(format!("Unknown item {}", handle)))
    }

    /// Checked-out item behind `handle`.
    pub fn get_mut(&mut self, handle: usize) -> Result<&mut P> {
        if !self.in_use.get(handle).copied().unwrap_or(false) {
            return Err(NetworkError::pool(format!(
                "Item {} is not checked out",
                handle
            )));
        }
        Ok(&mut self.items[handle])
    }

    /// Number of items ever created.
    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Number of items checked out.
    pub fn usage(&self) -> usize {
        self.in_use.iter().filter(|&&in_use| in_use).count()
    }
}

impl<P> fmt::Debug for ProcessorsPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorsPool")
            .field("size", &self.size())
            .field("usage", &self.usage())
            .field("available", &self.available)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::layers::{LayerInterface, LayerType};
    use crate::processor::{FeedforwardProcessor, NeuralProcessor};

    fn pool() -> ProcessorsPool<FeedforwardProcessor> {
        let interfaces = vec![
            LayerInterface::new(2),
            LayerInterface::new(2)
                .with_connection(LayerType::Feedforward)
                .with_activation(ActivationFunction::Sigmoid),
        ];
        ProcessorsPool::new(move |id| FeedforwardProcessor::new(id, &interfaces, false, None))
    }

    #[test]
    fn test_release_all_restores_creation_order() {
        let mut pool = pool();
        let handles: Vec<_> = (0..4).map(|_| pool.get_item().unwrap()).collect();
        assert_eq!(handles, vec![0, 1, 2, 3]);
        assert_eq!(pool.usage(), 4);

        pool.release_item(2).unwrap();
        pool.release_item(0).unwrap();
        pool.release_all();
        assert_eq!(pool.usage(), 0);

        for (expected, _) in handles.iter().enumerate() {
            let handle = pool.get_item().unwrap();
            assert_eq!(handle, expected);
            assert_eq!(pool.get(handle).unwrap().id(), expected);
            assert_eq!(pool.usage(), expected + 1);
        }
        assert_eq!(pool.size(), 4);
    }

    #[test]
    fn test_released_items_are_reused_first() {
        let mut pool = pool();
        let a = pool.get_item().unwrap();
        let b = pool.get_item().unwrap();
        let c = pool.get_item().unwrap();

        pool.release_item(c).unwrap();
        pool.release_item(a).unwrap();
        assert_eq!(pool.get_item().unwrap(), c);
        assert_eq!(pool.get_item().unwrap(), a);
        assert_eq!(pool.get_item().unwrap(), 3);
        assert_eq!(pool.size(), 4);
        assert!(pool.get_mut(b).is_ok());
    }

    #[test]
    fn test_misuse() {
        let mut pool = pool();
        let handle = pool.get_item().unwrap();
        pool.release_item(handle).unwrap();

        assert!(matches!(pool.release_item(handle), Err(NetworkError::Pool { .. })));
        assert!(matches!(pool.release_item(7), Err(NetworkError::Pool { .. })));
        assert!(pool.get_mut(handle).is_err());
        assert!(pool.get(handle).is_ok());
        assert_eq!(pool.usage(), 0);
    }
}
