// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! Segments, configurations and a query walk shared by the star-tree tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::segment::{DataType, MemorySegment, MemorySegmentBuilder, RawValue, Segment};
use crate::core::startree::aggregation::{
    AggregatedValue, AggregationFunction, AggregationFunctionColumnPair,
};
use crate::core::startree::config::{MetricAggFuncPair, StarTreeV2Config};
use crate::core::startree::loader::StarTreeV2;
use crate::core::startree::node::StarTreeNode;
use crate::core::startree::STAR_VALUE;
use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

const NAMES: [&str; 6] = ["Sunita", "Subbu", "Sunita", "Zackie", "Zackie", "Sunita"];
const COUNTRIES: [&str; 6] = ["CH", "IN", "CA", "CH", "CH", "CH"];
const LANGUAGES: [&str; 6] = ["Hin", "Eng", "Kor", "Eng", "Kor", "Hin"];
const SALARIES: [i32; 6] = [2, 2, 3, 8, 8, 5];

const COLUMNS: [(&str, DataType); 4] = [
    ("Name", DataType::String),
    ("Country", DataType::String),
    ("Language", DataType::String),
    ("salary", DataType::Int),
];

/// Six hand-written rows.
pub fn sample_segment() -> MemorySegment {
    let mut builder = MemorySegmentBuilder::new(&COLUMNS);
    for i in 0..NAMES.len() {
        builder
            .add_row(vec![
                RawValue::from(NAMES[i]),
                RawValue::from(COUNTRIES[i]),
                RawValue::from(LANGUAGES[i]),
                RawValue::Int(SALARIES[i]),
            ])
            .unwrap();
    }
    builder.build().unwrap()
}

/// `num_docs` rows of `<column>-v<0..100>` dimensions and a salary below 10000.
pub fn random_segment(num_docs: usize, seed: u64) -> MemorySegment {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut builder = MemorySegmentBuilder::new(&COLUMNS);
    for _ in 0..num_docs {
        let mut row = Vec::with_capacity(COLUMNS.len());
        for (name, _) in &COLUMNS[..3] {
            row.push(RawValue::String(format!(
                "{}-v{}",
                name,
                rng.gen_range(0, 100)
            )));
        }
        row.push(RawValue::Int(rng.gen_range(0, 10_000)));
        builder.add_row(row).unwrap();
    }
    builder.build().unwrap()
}

/// Name, Country and Language with `count__*` and `sum__salary`.
pub fn sample_config(out_dir: &Path) -> StarTreeV2Config {
    StarTreeV2Config::new(
        &["Name", "Country", "Language"],
        vec![
            MetricAggFuncPair::new("count", "*"),
            MetricAggFuncPair::new("sum", "salary"),
        ],
        out_dir,
    )
}

/// A filter on dictionary ids.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(i32),
    In(Vec<i32>),
    NotIn(Vec<i32>),
}

impl Predicate {
    pub fn matches(&self, dict_id: i32) -> bool {
        match self {
            Predicate::Eq(id) => *id == dict_id,
            Predicate::In(ids) => ids.contains(&dict_id),
            Predicate::NotIn(ids) => !ids.contains(&dict_id),
        }
    }
}

/// Dictionary ids of `values` in `column`.
pub fn dict_ids<S: Segment + ?Sized>(segment: &S, column: &str, values: &[&str]) -> Vec<i32> {
    let dictionary = segment.dictionary(column).unwrap();
    values
        .iter()
        .map(|v| dictionary.index_of(&RawValue::from(*v)).unwrap())
        .collect()
}

/// `SELECT <pairs> WHERE <predicates> GROUP BY <group_by>`.
#[derive(Debug, Default)]
pub struct Query<'a> {
    pub predicates: Vec<(&'a str, Predicate)>,
    pub group_by: Vec<&'a str>,
}

/// Aggregates by group key, the dictionary ids of the group-by columns.
pub type GroupedResult = BTreeMap<Vec<i32>, Vec<AggregatedValue>>;

fn accumulate(
    result: &mut GroupedResult,
    key: Vec<i32>,
    metrics: Vec<AggregatedValue>,
    functions: &[AggregationFunction],
) -> Result<()> {
    match result.get_mut(&key) {
        Some(existing) => {
            let previous = ::std::mem::replace(existing, Vec::new());
            for ((left, right), function) in previous.into_iter().zip(&metrics).zip(functions) {
                existing.push(function.aggregate(left, right)?);
            }
        }
        None => {
            result.insert(key, metrics);
        }
    }
    Ok(())
}

/// Answers `query` by reading every row of the segment.
pub fn scan_segment<S: Segment + ?Sized>(
    segment: &S,
    pairs: &[AggregationFunctionColumnPair],
    query: &Query,
) -> Result<GroupedResult> {
    let functions = pairs
        .iter()
        .map(AggregationFunctionColumnPair::function)
        .collect::<Result<Vec<_>>>()?;
    let mut filters = Vec::new();
    for (column, predicate) in &query.predicates {
        filters.push((segment.column_reader(column)?, predicate));
    }
    let mut group_by = Vec::new();
    for column in &query.group_by {
        group_by.push(segment.column_reader(column)?);
    }
    let mut metric_readers = Vec::new();
    for (pair, function) in pairs.iter().zip(&functions) {
        if function.reads_column() {
            metric_readers.push(Some(segment.column_reader(&pair.column)?));
        } else {
            metric_readers.push(None);
        }
    }

    let mut result = GroupedResult::new();
    'docs: for doc_id in 0..segment.num_docs() {
        for (reader, predicate) in &filters {
            if !predicate.matches(reader.dictionary_id_at(doc_id)?) {
                continue 'docs;
            }
        }
        let mut key = Vec::with_capacity(group_by.len());
        for reader in &group_by {
            key.push(reader.dictionary_id_at(doc_id)?);
        }
        let mut metrics = Vec::with_capacity(functions.len());
        for (function, reader) in functions.iter().zip(&metric_readers) {
            let raw = match reader {
                Some(reader) => reader.raw_value_at(doc_id)?,
                None => RawValue::Long(1),
            };
            metrics.push(function.convert(&raw)?);
        }
        accumulate(&mut result, key, metrics, &functions)?;
    }
    Ok(result)
}

struct Visit {
    node: StarTreeNode,
    remaining_predicates: HashSet<usize>,
    remaining_group_by: HashSet<usize>,
    path: HashMap<usize, i32>,
}

/// Answers `query` from a loaded star-tree.
///
/// Predicated dimensions select matching children, group-by dimensions take
/// every non-star child, any other dimension takes the star child when there
/// is one. A node with nothing left to filter or group contributes its
/// aggregated document, a leaf contributes its records.
pub fn traverse_star_tree(tree: &StarTreeV2, query: &Query) -> Result<GroupedResult> {
    let dimension_id = |name: &str| -> Result<usize> {
        match tree.dimension_data_source(name) {
            Some(source) => Ok(source.dimension_id()),
            None => bail!(IllegalArgument(format!("no dimension {} in star-tree", name))),
        }
    };
    let mut predicates = HashMap::new();
    for (name, predicate) in &query.predicates {
        predicates.insert(dimension_id(name)?, predicate);
    }
    let mut group_by = Vec::with_capacity(query.group_by.len());
    for name in &query.group_by {
        group_by.push(dimension_id(name)?);
    }

    let star_tree = tree.star_tree();
    let mut matches: Vec<(usize, HashMap<usize, i32>)> = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(Visit {
        node: star_tree.root()?,
        remaining_predicates: predicates.keys().cloned().collect(),
        remaining_group_by: group_by.iter().cloned().collect(),
        path: HashMap::new(),
    });
    while let Some(visit) = queue.pop_front() {
        let node = visit.node;
        if visit.remaining_predicates.is_empty() && visit.remaining_group_by.is_empty() {
            matches.push((node.agg_doc_id as usize, visit.path));
            continue;
        }
        if node.is_leaf() {
            for doc_id in node.start_doc_id..node.end_doc_id {
                matches.push((doc_id as usize, visit.path.clone()));
            }
            continue;
        }

        let split = match star_tree.child_dimension_id(&node)? {
            Some(split) => split,
            None => continue,
        };
        let non_star: Vec<StarTreeNode> = star_tree
            .children(&node)?
            .into_iter()
            .filter(|c| c.dimension_value != STAR_VALUE)
            .collect();
        let selected = if let Some(predicate) = predicates.get(&split) {
            non_star
                .into_iter()
                .filter(|c| predicate.matches(c.dimension_value))
                .collect()
        } else if group_by.contains(&split) {
            non_star
        } else {
            match star_tree.star_child(&node)? {
                Some(star) => vec![star],
                None => non_star,
            }
        };

        let mut remaining_predicates = visit.remaining_predicates.clone();
        remaining_predicates.remove(&split);
        let mut remaining_group_by = visit.remaining_group_by.clone();
        remaining_group_by.remove(&split);
        for child in selected {
            let mut path = visit.path.clone();
            if child.dimension_value != STAR_VALUE {
                path.insert(split, child.dimension_value);
            }
            queue.push_back(Visit {
                node: child,
                remaining_predicates: remaining_predicates.clone(),
                remaining_group_by: remaining_group_by.clone(),
                path,
            });
        }
    }

    let functions: Vec<AggregationFunction> = tree
        .metric_data_sources()
        .iter()
        .map(|m| m.function().clone())
        .collect();
    let value_of = |dimension: usize, doc_id: usize, path: &HashMap<usize, i32>| -> Result<i32> {
        match path.get(&dimension) {
            Some(value) => Ok(*value),
            None => match tree.dimension_data_source_by_id(dimension) {
                Some(source) => source.dictionary_id(doc_id),
                None => bail!(IllegalArgument(format!("no dimension {}", dimension))),
            },
        }
    };

    let mut result = GroupedResult::new();
    'docs: for (doc_id, path) in matches {
        for (&dimension, predicate) in &predicates {
            if !predicate.matches(value_of(dimension, doc_id, &path)?) {
                continue 'docs;
            }
        }
        let mut key = Vec::with_capacity(group_by.len());
        for &dimension in &group_by {
            key.push(value_of(dimension, doc_id, &path)?);
        }
        let mut metrics = Vec::with_capacity(functions.len());
        for source in tree.metric_data_sources() {
            metrics.push(source.value(doc_id)?);
        }
        accumulate(&mut result, key, metrics, &functions)?;
    }
    Ok(result)
}

/// Exact for counts, decimals and sketches, within rounding for doubles,
/// size and range for t-digests.
pub fn assert_same_results(
    functions: &[AggregationFunction],
    expected: &GroupedResult,
    actual: &GroupedResult,
) {
    let expected_keys: Vec<&Vec<i32>> = expected.keys().collect();
    let actual_keys: Vec<&Vec<i32>> = actual.keys().collect();
    assert_eq!(expected_keys, actual_keys);
    for (key, expected_values) in expected {
        let actual_values = &actual[key];
        for ((function, e), a) in functions.iter().zip(expected_values).zip(actual_values) {
            match (e, a) {
                (AggregatedValue::Double(e), AggregatedValue::Double(a)) => {
                    assert!(
                        (e - a).abs() <= 1e-9 * e.abs().max(1.0),
                        "{} of group {:?}: {} != {}",
                        function.function_type(),
                        key,
                        e,
                        a
                    );
                }
                (AggregatedValue::TDigest(e), AggregatedValue::TDigest(a)) => {
                    assert_eq!(e.size(), a.size());
                    assert_eq!(e.min(), a.min());
                    assert_eq!(e.max(), a.max());
                    let median = a.quantile(0.5);
                    assert!(median >= a.min() && median <= a.max());
                }
                _ => assert_eq!(e, a, "{} of group {:?}", function.function_type(), key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::startree::builder::StarTreeBuilder;
    use crate::core::startree::config::BufferStrategy;
    use crate::core::startree::loader::StarTreeV2Loader;
    use crate::core::store::MmapDirectory;

    fn all_function_config(out_dir: &Path) -> StarTreeV2Config {
        StarTreeV2Config::new(
            &["Name", "Country", "Language"],
            vec![
                MetricAggFuncPair::new("count", "*"),
                MetricAggFuncPair::new("sum", "salary"),
                MetricAggFuncPair::new("min", "salary"),
                MetricAggFuncPair::new("max", "salary"),
                MetricAggFuncPair::new("sumPrecision", "salary").with_arguments(&["20", "2"]),
                MetricAggFuncPair::new("distinctCountHLL", "Name").with_arguments(&["8"]),
                MetricAggFuncPair::new("percentileTDigest", "salary"),
            ],
            out_dir,
        )
    }

    fn check_queries<S: Segment>(segment: &S, config: StarTreeV2Config, queries: &[Query]) {
        let out_dir = config.out_dir.clone();
        let builder = StarTreeBuilder::new(config).unwrap();
        let mut store: HashMap<String, String> = HashMap::new();
        let metadata = builder.run(segment, &mut store).unwrap();

        let directory = MmapDirectory::new(&out_dir).unwrap();
        let trees = StarTreeV2Loader::new(&directory).load(&store).unwrap();
        let tree = &trees[metadata.star_tree_id];
        let functions: Vec<AggregationFunction> = metadata
            .function_column_pairs
            .iter()
            .map(|p| p.function().unwrap())
            .collect();

        for query in queries {
            let expected = scan_segment(segment, &metadata.function_column_pairs, query).unwrap();
            let actual = traverse_star_tree(tree, query).unwrap();
            assert_same_results(&functions, &expected, &actual);
        }
    }

    fn sample_queries(segment: &MemorySegment) -> Vec<Query<'static>> {
        vec![
            Query::default(),
            Query {
                predicates: vec![],
                group_by: vec!["Country"],
            },
            Query {
                predicates: vec![(
                    "Name",
                    Predicate::Eq(dict_ids(segment, "Name", &["Sunita"])[0]),
                )],
                group_by: vec!["Language"],
            },
            Query {
                predicates: vec![(
                    "Country",
                    Predicate::In(dict_ids(segment, "Country", &["CH", "CA"])),
                )],
                group_by: vec![],
            },
            Query {
                predicates: vec![(
                    "Language",
                    Predicate::NotIn(dict_ids(segment, "Language", &["Eng"])),
                )],
                group_by: vec!["Name", "Country"],
            },
            Query {
                predicates: vec![
                    ("Name", Predicate::Eq(dict_ids(segment, "Name", &["Zackie"])[0])),
                    ("Language", Predicate::Eq(dict_ids(segment, "Language", &["Kor"])[0])),
                ],
                group_by: vec![],
            },
        ]
    }

    #[test]
    fn test_sample_rollup_on_heap() {
        let segment = sample_segment();
        let queries = sample_queries(&segment);
        for &max_num_leaf_records in &[1, 2, 100] {
            let dir = tempfile::tempdir().unwrap();
            let config =
                all_function_config(dir.path()).with_max_num_leaf_records(max_num_leaf_records);
            check_queries(&segment, config, &queries);
        }
    }

    #[test]
    fn test_sample_rollup_off_heap() {
        let segment = sample_segment();
        let queries = sample_queries(&segment);
        let dir = tempfile::tempdir().unwrap();
        let config = all_function_config(dir.path())
            .with_max_num_leaf_records(1)
            .with_buffer(BufferStrategy::OffHeap);
        check_queries(&segment, config, &queries);
    }

    #[test]
    fn test_sample_rollup_without_star_nodes() {
        let segment = sample_segment();
        let queries = sample_queries(&segment);
        let dir = tempfile::tempdir().unwrap();
        let config = all_function_config(dir.path())
            .with_split_order(&["Language", "Country", "Name"])
            .with_dimensions_without_star_node(&["Country"])
            .with_max_num_leaf_records(1);
        check_queries(&segment, config, &queries);
    }

    #[test]
    fn test_random_rollup() {
        let segment = random_segment(10_000, 42);
        let mut rng = StdRng::seed_from_u64(43);
        let pick = |rng: &mut StdRng, column: &str| -> i32 {
            let cardinality = segment.dictionary(column).unwrap().cardinality();
            rng.gen_range(0, cardinality as i32)
        };
        let name = pick(&mut rng, "Name");
        let countries = vec![pick(&mut rng, "Country"), pick(&mut rng, "Country")];
        let language = pick(&mut rng, "Language");
        let queries = vec![
            Query::default(),
            Query {
                predicates: vec![("Name", Predicate::Eq(name))],
                group_by: vec![],
            },
            Query {
                predicates: vec![("Country", Predicate::In(countries.clone()))],
                group_by: vec!["Language"],
            },
            Query {
                predicates: vec![("Language", Predicate::NotIn(vec![language]))],
                group_by: vec!["Country"],
            },
            Query {
                predicates: vec![
                    ("Name", Predicate::Eq(name)),
                    ("Country", Predicate::NotIn(countries)),
                ],
                group_by: vec!["Language"],
            },
        ];

        for &(max_num_leaf_records, buffer) in &[
            (1, BufferStrategy::OnHeap),
            (50, BufferStrategy::OffHeap),
        ] {
            let dir = tempfile::tempdir().unwrap();
            let config = StarTreeV2Config::new(
                &["Name", "Country", "Language"],
                vec![
                    MetricAggFuncPair::new("count", "*"),
                    MetricAggFuncPair::new("sum", "salary"),
                    MetricAggFuncPair::new("max", "salary"),
                ],
                dir.path(),
            )
            .with_max_num_leaf_records(max_num_leaf_records)
            .with_buffer(buffer);
            check_queries(&segment, config, &queries);
        }
    }
}
