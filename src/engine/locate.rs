//! engine::locate
//!
//! The Location Resolver.
//!
//! # Reads
//!
//! Nodes are searched in input order. A node is skipped when the
//! identifier is tagged and the node carries none of its tags. A mapper
//! answering "no mapping" or "no match" passes the lookup on. A location
//! is accepted if it is composite, if the mapper bypass produced a value,
//! or if storage reports every path present. A failing bypass skips the
//! node without consulting its storage.
//!
//! # Writes
//!
//! Every output is a target. Every location produced is returned, in
//! output order.
//!
//! # Dotted Types
//!
//! `a.b.c` maps `a`, which must be composite. Its component `b` names a
//! dataset type `t`, and `t.c` is then located from scratch across all
//! repositories.

use tracing::debug;

use super::error::ButlerError;
use super::repository::Repository;
use crate::core::graph::{NodeId, RepoGraph};
use crate::core::naming::split_head;
use crate::core::types::DataId;
use crate::mapper::{CompositeLocation, Location, MapperError};

/// Resolves dataset types against a bound graph.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    graph: &'a RepoGraph<Repository>,
}

impl<'a> Resolver<'a> {
    pub fn new(graph: &'a RepoGraph<Repository>) -> Self {
        Self { graph }
    }

    fn repository(&self, id: NodeId) -> Result<&'a Repository, ButlerError> {
        self.graph
            .handle(id)
            .ok_or_else(|| ButlerError::Invariant(format!("node {} is not bound", id)))
    }

    /// Find a readable location, or `None` if no repository has one.
    pub fn locate_read(
        &self,
        dataset_type: &str,
        data_id: &DataId,
    ) -> Result<Option<Location>, ButlerError> {
        let (head, rest) = split_head(dataset_type);

        for &id in self.graph.input_order()? {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            if !data_id.visible_in(node.tags()) {
                continue;
            }
            let repo = self.repository(id)?;
            let Some(location) = map_or_skip(repo, head, data_id, false)? else {
                continue;
            };

            if let Some(rest) = rest {
                let component = component_type(&location, head, rest)?;
                return self.locate_read(&component, location.data_id());
            }

            match location {
                Location::Composite(_) => return Ok(Some(location)),
                Location::Single(mut single) => {
                    let mapper = repo.mapper();
                    if mapper.has_bypass(head) {
                        match mapper.bypass(head, &single, data_id) {
                            Ok(value) => {
                                single.bypass = Some(value);
                                return Ok(Some(single.into()));
                            }
                            Err(err) => {
                                debug!(dataset_type = head, root = %repo.root(), error = %err, "bypass failed; skipping repository");
                                continue;
                            }
                        }
                    }
                    if repo.exists(&single)? {
                        return Ok(Some(single.into()));
                    }
                    debug!(dataset_type = head, root = %repo.root(), "mapped but not present");
                }
            }
        }
        Ok(None)
    }

    /// Every location a write must go to, in output order.
    pub fn locate_write(
        &self,
        dataset_type: &str,
        data_id: &DataId,
    ) -> Result<Vec<Location>, ButlerError> {
        let (head, rest) = split_head(dataset_type);
        let mut locations = Vec::new();

        for &id in self.graph.output_order()? {
            let repo = self.repository(id)?;
            let Some(location) = map_or_skip(repo, head, data_id, true)? else {
                continue;
            };
            if let Some(rest) = rest {
                let component = component_type(&location, head, rest)?;
                return self.locate_write(&component, location.data_id());
            }
            locations.push(location);
        }
        Ok(locations)
    }
}

/// Map in one repository; a repository without the type yields `None`.
fn map_or_skip(
    repo: &Repository,
    dataset_type: &str,
    data_id: &DataId,
    write: bool,
) -> Result<Option<Location>, ButlerError> {
    match repo.map(dataset_type, data_id, write) {
        Ok(location) => Ok(location),
        Err(MapperError::NoMapping(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// The dataset type to locate for `rest` inside composite `head`.
fn component_type(location: &Location, head: &str, rest: &str) -> Result<String, ButlerError> {
    let Location::Composite(CompositeLocation { components, .. }) = location else {
        return Err(ButlerError::Structural(format!(
            "'{}' is not a composite, so '{}.{}' has no meaning",
            head, head, rest
        )));
    };
    let (name, tail) = split_head(rest);
    let info = components.get(name).ok_or_else(|| {
        ButlerError::Structural(format!("composite '{}' has no component '{}'", head, name))
    })?;
    Ok(match tail {
        Some(tail) => format!("{}.{}", info.dataset_type, tail),
        None => info.dataset_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::CfgOrigin;
    use crate::core::repo_cfg::RepositoryCfg;
    use crate::core::types::{RepoUri, Tag};
    use crate::mapper::mock::{FailOn, MockMapper};
    use crate::mapper::{ComponentInfo, Mapper, TemplateMapper};
    use crate::storage::open_storage;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        graph: RepoGraph<Repository>,
        ids: Vec<NodeId>,
    }

    fn fixture(mocks: Vec<MockMapper>, readable: &[usize], outputs: &[usize]) -> Fixture {
        let mappers = mocks
            .into_iter()
            .map(|m| Arc::new(m) as Arc<dyn Mapper>)
            .collect();
        fixture_with(mappers, readable, outputs)
    }

    /// Independent repositories: `readable` read in order, `outputs` written.
    fn fixture_with(
        mappers: Vec<Arc<dyn Mapper>>,
        readable: &[usize],
        outputs: &[usize],
    ) -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut graph = RepoGraph::new();
        let mut ids = Vec::new();
        for (i, mapper) in mappers.into_iter().enumerate() {
            let root = RepoUri::new(temp.path().join(format!("r{}", i)).to_string_lossy().into_owned())
                .unwrap();
            let id = graph.add_node(
                RepositoryCfg::new(root.clone(), None, Default::default()),
                CfgOrigin::New,
                Some(root.clone()),
                false,
            );
            graph
                .bind(id, Repository::new(id, mapper, open_storage(&root).unwrap()))
                .unwrap();
            ids.push(id);
        }
        let readable: Vec<NodeId> = readable.iter().map(|&i| ids[i]).collect();
        let outputs: Vec<NodeId> = outputs.iter().map(|&i| ids[i]).collect();
        graph.compute_orders(&readable, &outputs).unwrap();
        Fixture {
            _temp: temp,
            graph,
            ids,
        }
    }

    fn store(fx: &Fixture, index: usize, dataset_type: &str, id: &DataId) {
        let repo = fx.graph.handle(fx.ids[index]).unwrap();
        repo.storage()
            .write(&MockMapper::path_for(dataset_type, id), &json!(index))
            .unwrap();
    }

    fn visit(v: i64) -> DataId {
        DataId::new().with("visit", v)
    }

    mod reads {
        use super::*;

        #[test]
        fn first_repository_holding_the_dataset_wins() {
            let fx = fixture(
                vec![
                    MockMapper::new("a").with_dataset("raw", &["visit"]),
                    MockMapper::new("b").with_dataset("raw", &["visit"]),
                ],
                &[0, 1],
                &[],
            );
            store(&fx, 1, "raw", &visit(1));
            let loc = Resolver::new(&fx.graph).locate_read("raw", &visit(1)).unwrap().unwrap();
            assert_eq!(loc.binding().unwrap().node, fx.ids[1]);

            store(&fx, 0, "raw", &visit(1));
            let loc = Resolver::new(&fx.graph).locate_read("raw", &visit(1)).unwrap().unwrap();
            assert_eq!(loc.binding().unwrap().node, fx.ids[0]);
        }

        #[test]
        fn unmapped_and_absent_give_none() {
            let fx = fixture(vec![MockMapper::new("a").with_dataset("raw", &["visit"])], &[0], &[]);
            let resolver = Resolver::new(&fx.graph);
            assert!(resolver.locate_read("calexp", &visit(1)).unwrap().is_none());
            assert!(resolver.locate_read("raw", &visit(1)).unwrap().is_none());
        }

        #[test]
        fn tagged_ids_skip_untagged_repositories() {
            let mut fx = fixture(
                vec![
                    MockMapper::new("a").with_dataset("raw", &["visit"]),
                    MockMapper::new("b").with_dataset("raw", &["visit"]),
                ],
                &[0, 1],
                &[],
            );
            let calib = Tag::new("calib").unwrap();
            fx.graph
                .propagate_tags(fx.ids[1], &BTreeSet::from([calib.clone()]));
            store(&fx, 0, "raw", &visit(1));
            store(&fx, 1, "raw", &visit(1));

            let loc = Resolver::new(&fx.graph)
                .locate_read("raw", &visit(1).tagged(calib))
                .unwrap()
                .unwrap();
            assert_eq!(loc.binding().unwrap().node, fx.ids[1]);
        }

        #[test]
        fn bypass_skips_existence_check() {
            let fx = fixture(
                vec![MockMapper::new("a")
                    .with_dataset("raw_md", &["visit"])
                    .with_bypass("raw_md", json!({"exptime": 30}))],
                &[0],
                &[],
            );
            let loc = Resolver::new(&fx.graph).locate_read("raw_md", &visit(1)).unwrap().unwrap();
            let Location::Single(single) = loc else {
                panic!("expected single location");
            };
            assert_eq!(single.bypass, Some(json!({"exptime": 30})));
        }

        #[test]
        fn failed_bypass_moves_to_next_repository() {
            let fx = fixture(
                vec![
                    MockMapper::new("a")
                        .with_dataset("raw_md", &["visit"])
                        .with_bypass("raw_md", json!({"exptime": 1}))
                        .fail_on(FailOn::Bypass("header unreadable".into())),
                    MockMapper::new("b")
                        .with_dataset("raw_md", &["visit"])
                        .with_bypass("raw_md", json!({"exptime": 30})),
                ],
                &[0, 1],
                &[],
            );
            store(&fx, 0, "raw_md", &visit(1));

            let loc = Resolver::new(&fx.graph).locate_read("raw_md", &visit(1)).unwrap().unwrap();
            assert_eq!(loc.binding().unwrap().node, fx.ids[1]);
            let Location::Single(single) = loc else {
                panic!("expected single location");
            };
            assert_eq!(single.bypass, Some(json!({"exptime": 30})));
        }

        #[test]
        fn mapper_failures_propagate() {
            let mock = MockMapper::new("a")
                .with_dataset("raw", &["visit"])
                .fail_on(FailOn::Map("registry offline".into()));
            let fx = fixture(vec![mock], &[0], &[]);
            assert!(matches!(
                Resolver::new(&fx.graph).locate_read("raw", &visit(1)),
                Err(ButlerError::Mapper(_))
            ));
        }
    }

    mod composites {
        use super::*;

        fn composite_mock() -> MockMapper {
            MockMapper::new("a")
                .with_dataset("image", &["visit"])
                .with_dataset("wcs", &["visit"])
                .with_composite(
                    "calexp",
                    vec![
                        ("image", ComponentInfo::new("image")),
                        ("wcs", ComponentInfo::new("wcs")),
                    ],
                )
        }

        #[test]
        fn composite_accepted_without_storage() {
            let fx = fixture(vec![composite_mock()], &[0], &[0]);
            let loc = Resolver::new(&fx.graph).locate_read("calexp", &visit(1)).unwrap().unwrap();
            assert!(loc.is_composite());
        }

        #[test]
        fn dotted_type_resolves_component() {
            let fx = fixture(vec![composite_mock()], &[0], &[0]);
            store(&fx, 0, "wcs", &visit(1));
            let loc = Resolver::new(&fx.graph).locate_read("calexp.wcs", &visit(1)).unwrap().unwrap();
            assert_eq!(loc.dataset_type(), "wcs");

            let writes = Resolver::new(&fx.graph).locate_write("calexp.wcs", &visit(1)).unwrap();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].dataset_type(), "wcs");
        }

        #[test]
        fn dotted_type_on_plain_dataset_is_structural() {
            let fx = fixture(vec![composite_mock()], &[0], &[0]);
            assert!(matches!(
                Resolver::new(&fx.graph).locate_read("image.wcs", &visit(1)),
                Err(ButlerError::Structural(_))
            ));
            assert!(matches!(
                Resolver::new(&fx.graph).locate_read("calexp.psf", &visit(1)),
                Err(ButlerError::Structural(_))
            ));
        }
    }

    mod writes {
        use super::*;

        #[test]
        fn every_output_is_a_target() {
            let fx = fixture(
                vec![
                    MockMapper::new("a").with_dataset("raw", &["visit"]),
                    MockMapper::new("b"),
                    MockMapper::new("c").with_dataset("raw", &["visit"]),
                ],
                &[],
                &[0, 1, 2],
            );
            let locs = Resolver::new(&fx.graph).locate_write("raw", &visit(1)).unwrap();
            let nodes: Vec<NodeId> = locs.iter().map(|l| l.binding().unwrap().node).collect();
            assert_eq!(nodes, vec![fx.ids[0], fx.ids[2]]);
        }

        #[test]
        fn nothing_mapped_is_empty() {
            let fx = fixture(vec![MockMapper::new("a")], &[], &[0]);
            assert!(Resolver::new(&fx.graph).locate_write("raw", &visit(1)).unwrap().is_empty());
        }

        #[test]
        fn incomplete_ids_fail() {
            let args = serde_json::from_value(json!({
                "datasets": {"raw": {"template": "raw/{visit}-{ccd}.json"}}
            }))
            .unwrap();
            let mapper =
                TemplateMapper::from_args(crate::core::types::MapperName::new("t").unwrap(), &args, None)
                    .unwrap();
            let fx = fixture_with(vec![Arc::new(mapper)], &[], &[0]);
            assert!(matches!(
                Resolver::new(&fx.graph).locate_write("raw", &visit(1)),
                Err(ButlerError::Mapper(MapperError::IncompleteId { .. }))
            ));
        }
    }
}
