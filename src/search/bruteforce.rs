use crate::cell::UnitCell;
use crate::errors::Error;
use crate::kernels::{distance_array, self_distance_array, Execution};
use crate::types::Vector3D;

use super::{collect_pairs, CutoffInterval, PairList, PairSearch};

/// Exact reference implementation: evaluate every distance with
/// [`distance_array`] / [`self_distance_array`] and keep the ones inside the
/// cutoff interval. O(n·m) time and memory.
pub struct BruteForce;

impl PairSearch for BruteForce {
    fn paired(
        &self,
        reference: &[Vector3D],
        configuration: &[Vector3D],
        cell: &UnitCell,
        interval: CutoffInterval,
        return_distances: bool,
    ) -> Result<PairList, Error> {
        let distances = distance_array(reference, configuration, cell, Execution::Serial);

        let mut entries = Vec::new();
        for ((i, j), &distance) in distances.indexed_iter() {
            if interval.contains(distance) {
                entries.push((i, j, distance));
            }
        }

        return Ok(collect_pairs(entries, return_distances));
    }

    fn self_paired(
        &self,
        reference: &[Vector3D],
        cell: &UnitCell,
        interval: CutoffInterval,
        return_distances: bool,
    ) -> Result<PairList, Error> {
        let distances = self_distance_array(reference, cell, Execution::Serial);

        let mut entries = Vec::new();
        let mut k = 0;
        for i in 0..reference.len() {
            for j in (i + 1)..reference.len() {
                let distance = distances[k];
                k += 1;
                if interval.contains(distance) {
                    entries.push((i, j, distance));
                }
            }
        }
        debug_assert_eq!(k, distances.len());

        return Ok(collect_pairs(entries, return_distances));
    }
}
