//! Token-id batches passed into and out of `RagModel::generate`.

use crate::device::Device;
use serde::Serialize;

/// Encoded questions, right-padded to a common length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionBatch {
    pub input_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u8>>,
    pub pad_id: u32,
    pub device: Device,
}

impl QuestionBatch {
    /// Move the batch to `device`.
    pub fn to(mut self, device: Device) -> Self {
        if self.device != device {
            tracing::debug!("Moving question batch {} -> {}", self.device, device);
        }
        self.device = device;
        self
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Generated sequences, `num_return_sequences` consecutive rows per
/// question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedBatch {
    pub sequences: Vec<Vec<u32>>,
    pub num_return_sequences: usize,
}

impl GeneratedBatch {
    /// Rows belonging to each question, in question order.
    pub fn per_question(&self) -> impl Iterator<Item = &[Vec<u32>]> {
        self.sequences.chunks(self.num_return_sequences.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_device() {
        let batch = QuestionBatch {
            input_ids: vec![vec![0, 5, 2]],
            attention_mask: vec![vec![1, 1, 1]],
            pad_id: 1,
            device: Device::Cpu,
        };
        let moved = batch.clone().to(Device::Accelerator);
        assert_eq!(moved.device, Device::Accelerator);
        assert_eq!(moved.input_ids, batch.input_ids);
        assert_eq!(moved.len(), 1);
    }

    #[test]
    fn test_per_question() {
        let generated = GeneratedBatch {
            sequences: vec![vec![1], vec![2], vec![3], vec![4]],
            num_return_sequences: 2,
        };
        let groups: Vec<_> = generated.per_question().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].to_vec(), vec![vec![3u32], vec![4]]);
    }
}
