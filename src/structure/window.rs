//! Temporal neighbours of a structure within a sequence.

use super::StackedLayers;
use crate::error::{NetworkError, Result};
use crate::layers::LayerPeers;

/// Previous and next structures of the step being propagated.
///
/// A window lives for a single forward or backward call. It is built from
/// the sequence arena and the index of the current step, so every layer of
/// the current structure sees the same neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextWindow<'a> {
    /// Structure of the previous step
    pub prev: Option<&'a StackedLayers>,
    /// Structure of the next step
    pub next: Option<&'a StackedLayers>,
}

impl<'a> ContextWindow<'a> {
    /// Window of a structure without temporal neighbours.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Split `sequence` around `index`: the current structure is borrowed
    /// mutably, its neighbours immutably.
    pub fn around(
        sequence: &'a mut [StackedLayers],
        index: usize,
    ) -> Result<(ContextWindow<'a>, &'a mut StackedLayers)> {
        let len = sequence.len();
        let (before, rest) = sequence.split_at_mut(index.min(len));
        let (current, after) = rest.split_first_mut().ok_or_else(|| {
            NetworkError::propagation(format!(
                "Step {} is outside a sequence of {} steps",
                index, len
            ))
        })?;

        let before: &'a [StackedLayers] = before;
        let after: &'a [StackedLayers] = after;
        let window = ContextWindow {
            prev: before.last(),
            next: after.first(),
        };
        Ok((window, current))
    }

    /// Peers of the layer at `layer_index`.
    pub fn peers(&self, layer_index: usize) -> LayerPeers<'a> {
        LayerPeers {
            prev: self.prev.and_then(|s| s.layers().get(layer_index)),
            next: self.next.and_then(|s| s.layers().get(layer_index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::layers::{LayerInterface, LayerType};

    fn sequence(len: usize) -> Vec<StackedLayers> {
        let interfaces = vec![
            LayerInterface::new(2),
            LayerInterface::new(3)
                .with_connection(LayerType::Lstm)
                .with_activation(ActivationFunction::Tanh),
        ];
        (0..len)
            .map(|_| StackedLayers::new(&interfaces).unwrap())
            .collect()
    }

    #[test]
    fn test_window_edges() {
        let mut steps = sequence(3);

        let (window, _) = ContextWindow::around(&mut steps, 0).unwrap();
        assert!(window.prev.is_none());
        assert!(window.next.is_some());

        let (window, _) = ContextWindow::around(&mut steps, 2).unwrap();
        assert!(window.prev.is_some());
        assert!(window.next.is_none());
        assert!(window.peers(0).prev.is_some());
        assert!(window.peers(1).prev.is_none());
    }

    #[test]
    fn test_window_out_of_range() {
        let mut steps = sequence(2);
        assert!(ContextWindow::around(&mut steps, 2).is_err());
        assert!(ContextWindow::around(&mut [], 0).is_err());
    }
}
