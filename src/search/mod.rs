//! Fixed-radius neighbor search: find all pairs of points closer than a
//! cutoff, either between two coordinate sets or inside a single set, with
//! minimum image distances when a periodic cell is given.
//!
//! Three interchangeable implementations are provided ([`Method`]): brute
//! force evaluation of every distance, a cell list, and a kd-tree over
//! periodic images. They all go through the same minimum image distance for
//! the final filtering, so for a given input they return the same pairs with
//! bit-identical distances, and only differ in speed and memory use. The
//! entry points ([`capped_distance`] and [`self_capped_distance`]) pick an
//! implementation from the input sizes, the cutoff and the system extent,
//! unless [`SearchParameters::method`] forces one.

use log::debug;

use crate::cell::UnitCell;
use crate::errors::Error;
use crate::kernels::narrowed;
use crate::types::Vector3D;

mod bruteforce;
use self::bruteforce::BruteForce;

mod cell_list;
use self::cell_list::Grid;

mod kd_tree;
use self::kd_tree::Tree;

/// Below this number of points in either set, brute force is faster than
/// building any acceleration structure
const SMALL_PAIRED_SEARCH: usize = 10;

/// Above this number of pairwise distances, the quadratic memory use of
/// brute force is no longer acceptable
const LARGE_PAIRED_SEARCH: f64 = 1e8;

/// When the cutoff exceeds this fraction of the smallest system extent, grid
/// cells become too coarse to filter anything and brute force wins
const PAIRED_GRID_CUTOFF_FRACTION: f64 = 0.3;

/// Below this number of points, brute force is the fastest search inside a
/// single set
const SMALL_SELF_SEARCH: usize = 100;

/// When the cutoff is below this fraction of the smallest system extent, the
/// kd-tree beats the cell list for the search inside a single set
const SELF_TREE_CUTOFF_FRACTION: f64 = 0.03;

/// Available implementations of the fixed-radius search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Evaluate the full distance array and filter it. No setup cost, exact,
    /// and O(n·m) in time and memory.
    BruteForce,
    /// Bin the points in a cell list and only evaluate distances between
    /// neighboring cells. Works with any cell, and with a pseudo cell built
    /// around the coordinates when there is no periodicity.
    Grid,
    /// Query a kd-tree holding the points and their periodic images close to
    /// the cell faces. Fastest for small cutoffs in large systems, limited
    /// to cutoffs up to half of the smallest distance between cell faces.
    Tree,
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(method: &str) -> Result<Method, Error> {
        match method.to_lowercase().as_str() {
            "bruteforce" => Ok(Method::BruteForce),
            "grid" => Ok(Method::Grid),
            "tree" => Ok(Method::Tree),
            _ => Err(Error::InvalidParameter(format!(
                "unknown search method '{}', expected one of 'bruteforce', 'grid' or 'tree'",
                method
            ))),
        }
    }
}

impl Method {
    fn implementation(self) -> &'static dyn PairSearch {
        match self {
            Method::BruteForce => &BruteForce,
            Method::Grid => &Grid,
            Method::Tree => &Tree,
        }
    }
}

fn serde_default_return_distances() -> bool {
    return true;
}

/// Parameters for [`capped_distance`] and [`self_capped_distance`].
#[derive(Debug, Clone, Copy)]
#[derive(serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchParameters {
    /// Pairs are returned when their distance is at most `max_cutoff`
    pub max_cutoff: f64,
    /// When set, pairs at distances up to and including `min_cutoff` are
    /// discarded, leaving distances in the half open interval
    /// `(min_cutoff, max_cutoff]`
    #[serde(default)]
    pub min_cutoff: Option<f64>,
    /// Search implementation to use. When unset, one is selected from the
    /// input sizes, the cutoff and the system extent.
    #[serde(default)]
    pub method: Option<Method>,
    /// Whether to return the distance for each pair together with the
    /// indexes (`true` by default)
    #[serde(default = "serde_default_return_distances")]
    pub return_distances: bool,
}

impl SearchParameters {
    /// Create parameters for a search up to `max_cutoff`, with no lower
    /// bound, automatic method selection, and distances returned.
    pub fn new(max_cutoff: f64) -> SearchParameters {
        SearchParameters {
            max_cutoff: max_cutoff,
            min_cutoff: None,
            method: None,
            return_distances: true,
        }
    }

    /// Read parameters from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, contains unknown fields,
    /// or describes invalid cutoffs.
    pub fn from_json(json: &str) -> Result<SearchParameters, Error> {
        let parameters = serde_json::from_str::<SearchParameters>(json)?;
        parameters.validate()?;
        return Ok(parameters);
    }

    /// Validate the cutoff values in these parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_cutoff` is not finite and positive, or if
    /// `min_cutoff` is set and not inside `[0, max_cutoff)`.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.max_cutoff.is_finite() || self.max_cutoff <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "expected a finite, positive max_cutoff, got {}", self.max_cutoff
            )));
        }

        if let Some(min_cutoff) = self.min_cutoff {
            if !min_cutoff.is_finite() || min_cutoff < 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "expected a finite, non-negative min_cutoff, got {}", min_cutoff
                )));
            }

            if min_cutoff >= self.max_cutoff {
                return Err(Error::InvalidParameter(format!(
                    "min_cutoff ({}) must be smaller than max_cutoff ({})",
                    min_cutoff, self.max_cutoff
                )));
            }
        }

        return Ok(());
    }

    fn interval(&self) -> CutoffInterval {
        CutoffInterval {
            max_cutoff: self.max_cutoff,
            min_cutoff: self.min_cutoff,
        }
    }
}

/// Half open interval `(min_cutoff, max_cutoff]` used by all search
/// implementations when confirming candidate pairs
#[derive(Debug, Clone, Copy)]
struct CutoffInterval {
    max_cutoff: f64,
    min_cutoff: Option<f64>,
}

impl CutoffInterval {
    fn contains(self, distance: f64) -> bool {
        return distance <= self.max_cutoff
            && self.min_cutoff.map_or(true, |min_cutoff| distance > min_cutoff);
    }
}

/// Result of a fixed-radius search: a list of index pairs, and optionally
/// the distance for each pair.
///
/// Pairs are sorted by indexes. For a search between two sets, `pairs[k][0]`
/// indexes the reference set and `pairs[k][1]` the configuration set; for a
/// search inside a single set both indexes point to the same set and
/// `pairs[k][0] < pairs[k][1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairList {
    /// Indexes of the points in each pair
    pub pairs: Vec<[usize; 2]>,
    /// Minimum image distance for each pair, when requested
    pub distances: Option<Vec<f64>>,
}

impl PairList {
    /// Number of pairs in the list
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the search found no pair at all
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Sort the accumulated `(i, j, distance)` entries and split them into a
/// [`PairList`]
fn collect_pairs(mut entries: Vec<(usize, usize, f64)>, return_distances: bool) -> PairList {
    entries.sort_unstable_by_key(|&(i, j, _)| (i, j));

    let pairs = entries.iter().map(|&(i, j, _)| [i, j]).collect();
    let distances = if return_distances {
        Some(entries.iter().map(|&(_, _, distance)| distance).collect())
    } else {
        None
    };

    return PairList {
        pairs: pairs,
        distances: distances,
    };
}

/// Capability interface shared by the search implementations. Coordinates
/// are expected to already be rounded to single precision.
trait PairSearch {
    /// Pairs `(i, j)` between `reference` and `configuration` with a
    /// minimum image distance inside `interval`
    fn paired(
        &self,
        reference: &[Vector3D],
        configuration: &[Vector3D],
        cell: &UnitCell,
        interval: CutoffInterval,
        return_distances: bool,
    ) -> Result<PairList, Error>;

    /// Unique pairs `(i, j)` with `i < j` inside `reference`, with a minimum
    /// image distance inside `interval`
    fn self_paired(
        &self,
        reference: &[Vector3D],
        cell: &UnitCell,
        interval: CutoffInterval,
        return_distances: bool,
    ) -> Result<PairList, Error>;
}

/// Per-axis extent of the searched system: the span of the cell basis
/// vectors along each axis for periodic systems, the bounding box of the
/// coordinates otherwise
fn system_extent(cell: &UnitCell, coordinates: &[&[Vector3D]]) -> Vector3D {
    if cell.is_infinite() {
        let mut min = Vector3D::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Vector3D::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for set in coordinates {
            for position in *set {
                for k in 0..3 {
                    min[k] = f64::min(min[k], position[k]);
                    max[k] = f64::max(max[k], position[k]);
                }
            }
        }
        return max - min;
    }

    let matrix = cell.matrix();
    let mut extent = Vector3D::zero();
    for k in 0..3 {
        let min = f64::min(matrix[0][k], f64::min(matrix[1][k], matrix[2][k]));
        let max = f64::max(matrix[0][k], f64::max(matrix[1][k], matrix[2][k]));
        extent[k] = max - min;
    }
    return extent;
}

fn smallest_extent(cell: &UnitCell, coordinates: &[&[Vector3D]]) -> f64 {
    let extent = system_extent(cell, coordinates);
    return f64::min(extent[0], f64::min(extent[1], extent[2]));
}

fn resolve_paired_method(
    parameters: &SearchParameters,
    reference: &[Vector3D],
    configuration: &[Vector3D],
    cell: &UnitCell,
) -> Method {
    if let Some(method) = parameters.method {
        return method;
    }

    let n_ref = reference.len();
    let n_conf = configuration.len();
    let method = if n_ref < SMALL_PAIRED_SEARCH || n_conf < SMALL_PAIRED_SEARCH {
        Method::BruteForce
    } else if (n_ref as f64) * (n_conf as f64) >= LARGE_PAIRED_SEARCH {
        Method::Grid
    } else {
        let smallest = smallest_extent(cell, &[reference, configuration]);
        if parameters.max_cutoff > PAIRED_GRID_CUTOFF_FRACTION * smallest {
            Method::BruteForce
        } else {
            Method::Grid
        }
    };

    debug!(
        "selected {:?} for the search between {} and {} points with cutoff {}",
        method, n_ref, n_conf, parameters.max_cutoff
    );
    return method;
}

fn resolve_self_method(
    parameters: &SearchParameters,
    reference: &[Vector3D],
    cell: &UnitCell,
) -> Method {
    if let Some(method) = parameters.method {
        return method;
    }

    let method = if reference.len() < SMALL_SELF_SEARCH {
        Method::BruteForce
    } else {
        let smallest = smallest_extent(cell, &[reference]);
        if parameters.max_cutoff < SELF_TREE_CUTOFF_FRACTION * smallest {
            Method::Tree
        } else {
            Method::Grid
        }
    };

    debug!(
        "selected {:?} for the search within {} points with cutoff {}",
        method, reference.len(), parameters.max_cutoff
    );
    return method;
}

/// Find all pairs between `reference` and `configuration` with a minimum
/// image distance up to `parameters.max_cutoff` (and above
/// `parameters.min_cutoff` when set).
///
/// Coordinates are rounded to single precision before the search, and the
/// returned distances come from the same minimum image computation
/// regardless of the search method. Empty coordinate sets give an empty
/// result. If the two slices refer to the same points, each point is
/// reported paired with itself at distance 0 (use [`self_capped_distance`]
/// to search inside a single set instead).
///
/// # Errors
///
/// Returns an error if the cutoffs are invalid, or if
/// [`Method::Tree`] is explicitly requested with a cutoff
/// larger than half of the smallest distance between the cell faces.
#[time_graph::instrument]
pub fn capped_distance(
    reference: &[Vector3D],
    configuration: &[Vector3D],
    cell: &UnitCell,
    parameters: &SearchParameters,
) -> Result<PairList, Error> {
    parameters.validate()?;

    let reference = narrowed(reference);
    let configuration = narrowed(configuration);

    let method = resolve_paired_method(parameters, &reference, &configuration, cell);
    return method.implementation().paired(
        &reference,
        &configuration,
        cell,
        parameters.interval(),
        parameters.return_distances,
    );
}

/// Find all pairs of distinct points inside `reference` with a minimum
/// image distance up to `parameters.max_cutoff` (and above
/// `parameters.min_cutoff` when set).
///
/// Each unordered pair is reported exactly once, as `(i, j)` with `i < j`;
/// points are never paired with themselves. Coordinates are rounded to
/// single precision before the search, and the returned distances come from
/// the same minimum image computation regardless of the search method.
///
/// # Errors
///
/// Returns an error if the cutoffs are invalid, or if
/// [`Method::Tree`] is explicitly requested with a cutoff
/// larger than half of the smallest distance between the cell faces.
#[time_graph::instrument]
pub fn self_capped_distance(
    reference: &[Vector3D],
    cell: &UnitCell,
    parameters: &SearchParameters,
) -> Result<PairList, Error> {
    parameters.validate()?;

    let reference = narrowed(reference);

    let method = resolve_self_method(parameters, &reference, cell);
    return method.implementation().self_paired(
        &reference,
        cell,
        parameters.interval(),
        parameters.return_distances,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread_points(count: usize, scale: f64) -> Vec<Vector3D> {
        (0..count).map(|i| {
            let t = i as f64;
            Vector3D::new(
                scale * (0.5 + 0.5 * f64::sin(1.7 * t)),
                scale * (0.5 + 0.5 * f64::sin(2.3 * t + 1.0)),
                scale * (0.5 + 0.5 * f64::sin(3.1 * t + 2.0)),
            )
        }).collect()
    }

    #[test]
    fn method_names() {
        assert_eq!("bruteforce".parse::<Method>().unwrap(), Method::BruteForce);
        assert_eq!("Grid".parse::<Method>().unwrap(), Method::Grid);
        assert_eq!("TREE".parse::<Method>().unwrap(), Method::Tree);

        let error = "octree".parse::<Method>().unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid parameter: unknown search method 'octree', \
            expected one of 'bruteforce', 'grid' or 'tree'"
        );

        assert_eq!(serde_json::to_string(&Method::BruteForce).unwrap(), "\"bruteforce\"");
        assert_eq!(serde_json::from_str::<Method>("\"tree\"").unwrap(), Method::Tree);
    }

    #[test]
    fn parameters_validation() {
        assert!(SearchParameters::new(2.5).validate().is_ok());

        for max_cutoff in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let parameters = SearchParameters::new(max_cutoff);
            assert!(parameters.validate().is_err());
        }

        let mut parameters = SearchParameters::new(2.5);
        parameters.min_cutoff = Some(1.0);
        assert!(parameters.validate().is_ok());

        for min_cutoff in [-0.5, 2.5, 3.0, f64::NAN] {
            parameters.min_cutoff = Some(min_cutoff);
            assert!(parameters.validate().is_err());
        }
    }

    #[test]
    fn parameters_from_json() {
        let parameters = SearchParameters::from_json("{\"max_cutoff\": 3.5}").unwrap();
        assert_eq!(parameters.max_cutoff, 3.5);
        assert_eq!(parameters.min_cutoff, None);
        assert_eq!(parameters.method, None);
        assert!(parameters.return_distances);

        let parameters = SearchParameters::from_json(
            "{\"max_cutoff\": 3.5, \"min_cutoff\": 1.0, \"method\": \"grid\", \"return_distances\": false}"
        ).unwrap();
        assert_eq!(parameters.min_cutoff, Some(1.0));
        assert_eq!(parameters.method, Some(Method::Grid));
        assert!(!parameters.return_distances);

        // unknown fields are rejected
        let result = SearchParameters::from_json("{\"max_cutoff\": 3.5, \"cutoff\": 1.0}");
        assert!(result.unwrap_err().to_string().starts_with("json error:"));

        // validation runs on the parsed values
        let result = SearchParameters::from_json("{\"max_cutoff\": -3.5}");
        assert!(result.unwrap_err().to_string().contains("positive max_cutoff"));
    }

    #[test]
    fn cutoff_interval() {
        let interval = CutoffInterval { max_cutoff: 2.0, min_cutoff: None };
        assert!(interval.contains(0.0));
        assert!(interval.contains(2.0));
        assert!(!interval.contains(2.5));

        let interval = CutoffInterval { max_cutoff: 2.0, min_cutoff: Some(1.0) };
        assert!(!interval.contains(1.0));
        assert!(interval.contains(1.5));
        assert!(interval.contains(2.0));
    }

    #[test]
    fn paired_method_selection() {
        let cell = UnitCell::cubic(100.0);
        let few = spread_points(5, 50.0);
        let some = spread_points(500, 50.0);

        // small sets always use brute force
        let parameters = SearchParameters::new(10.0);
        assert_eq!(resolve_paired_method(&parameters, &few, &some, &cell), Method::BruteForce);
        assert_eq!(resolve_paired_method(&parameters, &some, &few, &cell), Method::BruteForce);

        // moderate sizes: the cutoff decides between grid and brute force
        let parameters = SearchParameters::new(5.0);
        assert_eq!(resolve_paired_method(&parameters, &some, &some, &cell), Method::Grid);
        let parameters = SearchParameters::new(40.0);
        assert_eq!(resolve_paired_method(&parameters, &some, &some, &cell), Method::BruteForce);

        // very large products always use the grid
        let huge = vec![Vector3D::zero(); 10_000];
        let parameters = SearchParameters::new(40.0);
        assert_eq!(resolve_paired_method(&parameters, &huge, &huge, &cell), Method::Grid);

        // an explicit method wins over all heuristics
        let mut parameters = SearchParameters::new(10.0);
        parameters.method = Some(Method::Tree);
        assert_eq!(resolve_paired_method(&parameters, &few, &few, &cell), Method::Tree);
    }

    #[test]
    fn self_method_selection() {
        let cell = UnitCell::cubic(100.0);
        let few = spread_points(50, 50.0);
        let some = spread_points(500, 50.0);

        let parameters = SearchParameters::new(10.0);
        assert_eq!(resolve_self_method(&parameters, &few, &cell), Method::BruteForce);

        // small cutoff: tree, larger cutoff: grid
        let parameters = SearchParameters::new(2.0);
        assert_eq!(resolve_self_method(&parameters, &some, &cell), Method::Tree);
        let parameters = SearchParameters::new(10.0);
        assert_eq!(resolve_self_method(&parameters, &some, &cell), Method::Grid);

        let mut parameters = SearchParameters::new(50.0);
        parameters.method = Some(Method::BruteForce);
        assert_eq!(resolve_self_method(&parameters, &some, &cell), Method::BruteForce);
    }

    #[test]
    fn extent_without_cell() {
        // without a cell, the extent is the bounding box of the coordinates
        let points = [
            Vector3D::new(1.0, -3.0, 0.0),
            Vector3D::new(4.0, 2.0, 0.5),
            Vector3D::new(2.0, 0.0, 2.0),
        ];
        let extent = system_extent(&UnitCell::infinite(), &[&points]);
        assert_eq!(extent, Vector3D::new(3.0, 5.0, 2.0));

        // with a cell, it is the span of the basis vectors
        let extent = system_extent(&UnitCell::orthorhombic(3.0, 4.0, 5.0), &[&points]);
        assert_eq!(extent, Vector3D::new(3.0, 4.0, 5.0));

        let cell = UnitCell::triclinic(10.0, 10.0, 10.0, 90.0, 90.0, 120.0);
        let extent = system_extent(&cell, &[&points]);
        // the b vector points towards negative x for gamma > 90°
        assert!(extent[0] > 10.0);
        assert!(extent[1] < 10.0);
    }
}
