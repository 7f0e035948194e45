//! End-to-end coordinator behaviour across repository lineages.
//!
//! Every test builds repositories on disk under a temporary directory,
//! then reopens them through fresh coordinators the way separate processing
//! runs would.

use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;

use strata::core::declaration::{ButlerArgs, Mode, RepositoryArgs};
use strata::core::types::{DataId, MapperName, RepoUri, Tag};
use strata::engine::{Butler, ButlerError, RepoRole};
use strata::mapper::mock::MockMapper;
use strata::mapper::MapperCatalog;
use strata::storage::read_cfg;

fn uri(path: &Path) -> RepoUri {
    RepoUri::new(path.to_string_lossy().into_owned()).unwrap()
}

fn visit(v: i64) -> DataId {
    DataId::new().with("visit", v)
}

fn mapper() -> MockMapper {
    MockMapper::new("mock")
        .with_dataset("raw", &["visit"])
        .with_dataset("calexp", &["visit"])
}

fn input(path: &Path) -> RepositoryArgs {
    RepositoryArgs::from_uri(uri(path))
}

fn rw_output(path: &Path) -> RepositoryArgs {
    RepositoryArgs::from_uri(uri(path))
        .with_mode(Mode::ReadWrite)
        .with_mapper(MapperName::new("mock").unwrap())
}

fn open(
    mock: &MockMapper,
    inputs: Vec<RepositoryArgs>,
    outputs: Vec<RepositoryArgs>,
) -> Result<Butler, ButlerError> {
    Butler::builder(ButlerArgs::with_repos(inputs, outputs))
        .catalog(MapperCatalog::new().with("mock", mock.ctor()))
        .build()
}

/// Create a repository at `path` with `parents`, holding `raw` datasets.
fn seed(mock: &MockMapper, path: &Path, parents: &[&Path], raws: &[(i64, Value)]) {
    let butler = open(
        mock,
        parents.iter().map(|p| input(p)).collect(),
        vec![rw_output(path)],
    )
    .unwrap();
    for (v, value) in raws {
        butler.put(value, "raw", &visit(*v), false).unwrap();
    }
}

mod lineage {
    use super::*;

    #[test]
    fn reads_fall_through_to_ancestors() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let (r1, r2) = (temp.path().join("r1"), temp.path().join("r2"));
        seed(&mock, &r1, &[], &[(1, json!("r1-v1")), (2, json!("r1-v2"))]);
        seed(&mock, &r2, &[&r1], &[(1, json!("r2-v1"))]);

        // Only r2 is named; r1 comes in through r2's recorded parents.
        let butler = open(&mock, vec![input(&r2)], vec![]).unwrap();
        assert_eq!(*butler.get("raw", &visit(1)).unwrap(), json!("r2-v1"));
        assert_eq!(*butler.get("raw", &visit(2)).unwrap(), json!("r1-v2"));
        assert!(!butler.dataset_exists("raw", &visit(3)).unwrap());
    }

    #[test]
    fn new_output_records_inputs_as_parents() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let (r1, r2) = (temp.path().join("r1"), temp.path().join("r2"));
        seed(&mock, &r1, &[], &[]);
        seed(&mock, &r2, &[&r1], &[]);

        let stored = read_cfg(&uri(&r2)).unwrap().unwrap();
        assert_eq!(stored.cfg.parents.len(), 1);
        assert_eq!(stored.cfg.mapper, Some(MapperName::new("mock").unwrap()));
    }

    #[test]
    fn writes_never_touch_inputs() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let (r1, out) = (temp.path().join("r1"), temp.path().join("out"));
        seed(&mock, &r1, &[], &[(1, json!("orig"))]);

        let butler = open(&mock, vec![input(&r1)], vec![rw_output(&out)]).unwrap();
        butler.put(&json!("new"), "raw", &visit(1), false).unwrap();
        assert_eq!(*butler.get("raw", &visit(1)).unwrap(), json!("new"));

        let again = open(&mock, vec![input(&r1)], vec![]).unwrap();
        assert_eq!(*again.get("raw", &visit(1)).unwrap(), json!("orig"));
    }

    #[test]
    fn write_only_output_is_not_searched() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let out = temp.path().join("out");
        let output = RepositoryArgs::from_uri(uri(&out))
            .with_mode(Mode::Write)
            .with_mapper(MapperName::new("mock").unwrap());

        let butler = open(&mock, vec![], vec![output]).unwrap();
        butler.put(&json!(1), "raw", &visit(1), false).unwrap();
        assert!(butler.get("raw", &visit(1)).unwrap_err().is_no_results());
    }

    #[test]
    fn reopening_with_other_parents_fails() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let (r1, other, out) = (
            temp.path().join("r1"),
            temp.path().join("other"),
            temp.path().join("out"),
        );
        seed(&mock, &r1, &[], &[]);
        seed(&mock, &other, &[], &[]);
        seed(&mock, &out, &[&r1], &[]);

        let result = open(&mock, vec![input(&other)], vec![rw_output(&out)]);
        assert!(result.is_err());

        // The same inputs still reopen cleanly.
        assert!(open(&mock, vec![input(&r1)], vec![rw_output(&out)]).is_ok());
    }

    #[test]
    fn describe_lists_roles() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let (r1, out) = (temp.path().join("r1"), temp.path().join("out"));
        seed(&mock, &r1, &[], &[]);

        let butler = open(&mock, vec![input(&r1)], vec![rw_output(&out)]).unwrap();
        let summaries = butler.describe().unwrap();
        let roles: Vec<(String, RepoRole)> = summaries
            .iter()
            .map(|s| (s.root.clone(), s.role))
            .collect();
        assert_eq!(
            roles,
            vec![
                (uri(&out).to_string(), RepoRole::Both),
                (uri(&r1).to_string(), RepoRole::Input),
            ]
        );
        assert_eq!(summaries[0].origin, "new");
        assert_eq!(summaries[0].parents, vec![uri(&r1).to_string()]);
    }
}

mod tags {
    use super::*;

    #[test]
    fn tagged_identifier_only_sees_tagged_repositories() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let (a, b) = (temp.path().join("a"), temp.path().join("b"));
        seed(&mock, &a, &[], &[(1, json!("from-a"))]);
        seed(&mock, &b, &[], &[(1, json!("from-b"))]);

        let butler = open(
            &mock,
            vec![
                input(&a).with_tag(Tag::new("first").unwrap()),
                input(&b).with_tag(Tag::new("second").unwrap()),
            ],
            vec![],
        )
        .unwrap();

        assert_eq!(*butler.get("raw", &visit(1)).unwrap(), json!("from-a"));
        let tagged = visit(1).tagged(Tag::new("second").unwrap());
        assert_eq!(*butler.get("raw", &tagged).unwrap(), json!("from-b"));
        let unknown = visit(1).tagged(Tag::new("third").unwrap());
        assert!(butler.get("raw", &unknown).unwrap_err().is_no_results());
    }

    #[test]
    fn tags_reach_ancestors() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let (r1, r2) = (temp.path().join("r1"), temp.path().join("r2"));
        seed(&mock, &r1, &[], &[(7, json!("deep"))]);
        seed(&mock, &r2, &[&r1], &[]);

        let butler = open(&mock, vec![input(&r2).with_tag(Tag::new("calib").unwrap())], vec![]).unwrap();
        let tagged = visit(7).tagged(Tag::new("calib").unwrap());
        assert_eq!(*butler.get("raw", &tagged).unwrap(), json!("deep"));
    }
}

mod aliases {
    use super::*;

    #[test]
    fn aliases_apply_to_reads_and_writes() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let out = temp.path().join("out");

        let butler = Butler::builder(ButlerArgs::with_repos(vec![], vec![rw_output(&out)]))
            .catalog(MapperCatalog::new().with("mock", mock.ctor()))
            .alias("cal", "calexp")
            .build()
            .unwrap();

        butler.put(&json!({"flux": 3}), "@cal", &visit(4), false).unwrap();
        assert_eq!(*butler.get("calexp", &visit(4)).unwrap(), json!({"flux": 3}));
        assert!(butler.dataset_exists("@cal", &visit(4)).unwrap());
    }

    #[test]
    fn unknown_alias_is_an_error() {
        let temp = TempDir::new().unwrap();
        let butler = open(&mapper(), vec![], vec![rw_output(&temp.path().join("out"))]).unwrap();
        let err = butler.get("@nope", &visit(1)).unwrap_err();
        assert!(matches!(err, ButlerError::Alias(_)));
    }

    #[test]
    fn overlapping_alias_rejected() {
        let temp = TempDir::new().unwrap();
        let mut butler = open(&mapper(), vec![], vec![rw_output(&temp.path().join("out"))]).unwrap();
        butler.define_alias("raw", "raw").unwrap();
        assert!(butler.define_alias("rawish", "calexp").is_err());
    }
}

mod backups {
    use super::*;

    #[test]
    fn backup_keeps_previous_document() {
        let temp = TempDir::new().unwrap();
        let mock = mapper();
        let out = temp.path().join("out");
        let butler = open(&mock, vec![], vec![rw_output(&out)]).unwrap();

        butler.put(&json!(1), "raw", &visit(1), false).unwrap();
        butler.put(&json!(2), "raw", &visit(1), true).unwrap();
        assert_eq!(*butler.get("raw", &visit(1)).unwrap(), json!(2));

        assert!(out.join("raw/visit-1.json~1").is_file());
        let previous: Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("raw/visit-1.json~1")).unwrap()).unwrap();
        assert_eq!(previous, json!(1));
    }
}
