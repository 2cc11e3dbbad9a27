use std::collections::BTreeMap;

use formats::{GeoJsonCollection, GeoJsonFeature, GeoJsonGeometry, GeometryKind};
use foundation::{FeatureId, GeoPoint, LevelId, centroid};
use serde_json::{Map, Value};
use tracing::warn;

use crate::level::Level;

/// Geometry of a feature, already narrowed to what its level draws.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    /// One or more polygons, each a list of rings (outer ring first).
    Area { polygons: Vec<Vec<Vec<GeoPoint>>> },
    Point(GeoPoint),
}

impl FeatureGeometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            FeatureGeometry::Area { .. } => GeometryKind::Polygon,
            FeatureGeometry::Point(_) => GeometryKind::Point,
        }
    }

    /// Every coordinate of the geometry, all rings included.
    pub fn vertices(&self) -> Box<dyn Iterator<Item = &GeoPoint> + '_> {
        match self {
            FeatureGeometry::Area { polygons } => {
                Box::new(polygons.iter().flatten().flatten())
            }
            FeatureGeometry::Point(p) => Box::new(std::iter::once(p)),
        }
    }

    /// Representative point for labels and markers: the point itself, or the
    /// vertex mean of the largest outer ring.
    pub fn anchor(&self) -> Option<GeoPoint> {
        match self {
            FeatureGeometry::Point(p) => Some(*p),
            FeatureGeometry::Area { polygons } => {
                let outer = polygons
                    .iter()
                    .filter_map(|poly| poly.first())
                    .max_by_key(|ring| ring.len())?;
                let mut ring: &[GeoPoint] = outer;
                if ring.len() > 1 && ring.first() == ring.last() {
                    ring = &ring[..ring.len() - 1];
                }
                centroid(ring)
            }
        }
    }

    pub fn to_geojson(&self) -> GeoJsonGeometry {
        match self {
            FeatureGeometry::Point(p) => GeoJsonGeometry::Point(*p),
            FeatureGeometry::Area { polygons } if polygons.len() == 1 => {
                GeoJsonGeometry::Polygon(polygons[0].clone())
            }
            FeatureGeometry::Area { polygons } => GeoJsonGeometry::MultiPolygon(polygons.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    /// Value of the level's parent-link field; `None` at the root.
    pub parent: Option<FeatureId>,
    pub geometry: FeatureGeometry,
    pub properties: Map<String, Value>,
}

/// Why a source feature was left out of its collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingId,
    DuplicateId(FeatureId),
    MissingGeometry,
    KindMismatch { found: &'static str },
    MissingParent,
    /// The source feature itself could not be parsed.
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub accepted: usize,
    /// `(source index, reason)` pairs in source order.
    pub skipped: Vec<(usize, SkipReason)>,
}

/// Immutable, ordered features of exactly one level.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    level: LevelId,
    features: Vec<Feature>,
    by_id: BTreeMap<FeatureId, usize>,
}

impl FeatureCollection {
    pub fn new(level: LevelId, features: Vec<Feature>) -> Self {
        let mut by_id = BTreeMap::new();
        for (idx, f) in features.iter().enumerate() {
            by_id.entry(f.id.clone()).or_insert(idx);
        }
        Self {
            level,
            features,
            by_id,
        }
    }

    /// Builds the collection for `level` from decoded GeoJSON.
    ///
    /// Source data is untrusted: features that failed to parse, lack an id,
    /// carry a geometry the level cannot draw or repeat an earlier id are
    /// skipped and logged.
    /// Non-root features without a parent value are kept out as well, since
    /// no filter could ever reach them.
    pub fn from_geojson(level: &Level, source: &GeoJsonCollection) -> (Self, DecodeReport) {
        let mut report = DecodeReport::default();
        let mut features: Vec<Feature> = Vec::with_capacity(source.features.len());
        let mut by_id: BTreeMap<FeatureId, usize> = BTreeMap::new();

        for (index, entry) in source.entries() {
            let raw = match entry {
                Ok(raw) => raw,
                Err(reason) => {
                    report
                        .skipped
                        .push((index, SkipReason::Malformed(reason.to_string())));
                    continue;
                }
            };
            match decode_feature(level, raw) {
                Ok(feature) => {
                    if by_id.contains_key(&feature.id) {
                        report
                            .skipped
                            .push((index, SkipReason::DuplicateId(feature.id.clone())));
                        continue;
                    }
                    by_id.insert(feature.id.clone(), features.len());
                    features.push(feature);
                }
                Err(reason) => report.skipped.push((index, reason)),
            }
        }

        for (index, reason) in &report.skipped {
            warn!(level = %level.id, index, ?reason, "skipping feature");
        }
        report.accepted = features.len();

        (
            Self {
                level: level.id.clone(),
                features,
                by_id,
            },
            report,
        )
    }

    pub fn level(&self) -> &LevelId {
        &self.level
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.by_id.get(id).map(|&idx| &self.features[idx])
    }

    pub fn index_of(&self, id: &FeatureId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

fn decode_feature(level: &Level, raw: &GeoJsonFeature) -> Result<Feature, SkipReason> {
    let id = raw
        .property_str(&level.id_field)
        .or_else(|| raw.id.clone())
        .filter(|s| !s.trim().is_empty())
        .map(FeatureId::new)
        .ok_or(SkipReason::MissingId)?;

    let parent = match &level.parent_field {
        Some(field) => Some(
            raw.property_str(field)
                .filter(|s| !s.trim().is_empty())
                .map(FeatureId::new)
                .ok_or(SkipReason::MissingParent)?,
        ),
        None => None,
    };

    let geometry = raw.geometry.as_ref().ok_or(SkipReason::MissingGeometry)?;
    let geometry = narrow_geometry(level.kind, geometry)?;

    let name = raw
        .property_str(&level.name_field)
        .unwrap_or_else(|| id.as_str().to_string());

    Ok(Feature {
        id,
        name,
        parent,
        geometry,
        properties: raw.properties.clone(),
    })
}

fn narrow_geometry(
    kind: GeometryKind,
    geometry: &GeoJsonGeometry,
) -> Result<FeatureGeometry, SkipReason> {
    match (kind, geometry) {
        (GeometryKind::Polygon, GeoJsonGeometry::Polygon(rings)) if !rings.is_empty() => {
            Ok(FeatureGeometry::Area {
                polygons: vec![rings.clone()],
            })
        }
        (GeometryKind::Polygon, GeoJsonGeometry::MultiPolygon(polys)) if !polys.is_empty() => {
            Ok(FeatureGeometry::Area {
                polygons: polys.clone(),
            })
        }
        (GeometryKind::Point, GeoJsonGeometry::Point(p)) => Ok(FeatureGeometry::Point(*p)),
        // A single-member MultiPoint is a common export artifact.
        (GeometryKind::Point, GeoJsonGeometry::MultiPoint(ps)) if ps.len() == 1 => {
            Ok(FeatureGeometry::Point(ps[0]))
        }
        (_, other) => Err(SkipReason::KindMismatch {
            found: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureCollection, FeatureGeometry, SkipReason};
    use crate::level::LevelRegistry;
    use formats::{GeoJsonCollection, GeometryKind, LevelEntry};
    use foundation::{FeatureId, GeoPoint, LevelId};

    fn registry() -> LevelRegistry {
        LevelRegistry::from_entries(&[
            LevelEntry::new("region", "Region", GeometryKind::Polygon, "r.geojson")
                .with_id_field("code"),
            LevelEntry::new("town", "Town", GeometryKind::Point, "t.geojson")
                .with_id_field("code")
                .with_parent_field("region"),
        ])
        .unwrap()
    }

    #[test]
    fn decodes_polygons_with_ids_and_names() {
        let reg = registry();
        let src = GeoJsonCollection::parse_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"code":"A","name":"Alpha"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
                {"type":"Feature","id":"B","properties":{},
                 "geometry":{"type":"MultiPolygon","coordinates":[[[[5,5],[6,5],[6,6],[5,5]]]]}}
            ]}"#,
        )
        .unwrap();
        let (c, report) = FeatureCollection::from_geojson(reg.root(), &src);
        assert_eq!(report.accepted, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(c.level(), &LevelId::new("region"));

        let a = c.get(&FeatureId::new("A")).unwrap();
        assert_eq!(a.name, "Alpha");
        assert_eq!(a.parent, None);
        assert_eq!(a.geometry.anchor(), Some(GeoPoint::new(1.0, 1.0)));

        // Falls back to the GeoJSON id and uses the id as display name.
        let b = c.get(&FeatureId::new("B")).unwrap();
        assert_eq!(b.name, "B");
    }

    #[test]
    fn skips_untrusted_features() {
        let reg = registry();
        let src = GeoJsonCollection::parse_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"code":1,"region":"A"},
                 "geometry":{"type":"Point","coordinates":[1,1]}},
                {"type":"Feature","properties":{"region":"A"},
                 "geometry":{"type":"Point","coordinates":[1,1]}},
                {"type":"Feature","properties":{"code":1,"region":"A"},
                 "geometry":{"type":"Point","coordinates":[2,2]}},
                {"type":"Feature","properties":{"code":2,"region":"A"},
                 "geometry":{"type":"LineString","coordinates":[[1,1],[2,2]]}},
                {"type":"Feature","properties":{"code":3},
                 "geometry":{"type":"Point","coordinates":[3,3]}},
                {"type":"Feature","properties":{"code":4,"region":"A"},"geometry":null}
            ]}"#,
        )
        .unwrap();
        let town = reg.level(&LevelId::new("town")).unwrap();
        let (c, report) = FeatureCollection::from_geojson(town, &src);
        assert_eq!(c.len(), 1);
        assert_eq!(
            c.features()[0].geometry,
            FeatureGeometry::Point(GeoPoint::new(1.0, 1.0))
        );
        assert_eq!(c.features()[0].parent, Some(FeatureId::new("A")));
        assert_eq!(
            report.skipped,
            vec![
                (1, SkipReason::MissingId),
                (2, SkipReason::DuplicateId(FeatureId::new("1"))),
                (3, SkipReason::KindMismatch { found: "LineString" }),
                (4, SkipReason::MissingParent),
                (5, SkipReason::MissingGeometry),
            ]
        );
    }

    #[test]
    fn malformed_features_keep_their_source_index() {
        let reg = registry();
        let src = GeoJsonCollection::parse_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"code":"A"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type":"Feature","properties":{"code":"B"},
                 "geometry":{"type":"GeometryCollection","geometries":[]}},
                {"type":"Feature","properties":{"code":"C"},
                 "geometry":{"type":"Polygon","coordinates":[[[2,2],[3,2],[3,3],[2,2]]]}}
            ]}"#,
        )
        .unwrap();
        let (c, report) = FeatureCollection::from_geojson(reg.root(), &src);
        assert_eq!(c.len(), 2);
        assert!(c.contains(&FeatureId::new("A")));
        assert!(c.contains(&FeatureId::new("C")));
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0], (1, SkipReason::Malformed(_))));
    }

    #[test]
    fn area_geometry_round_trips_to_geojson_type() {
        let single = FeatureGeometry::Area {
            polygons: vec![vec![vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0)]]],
        };
        assert_eq!(single.to_geojson().type_name(), "Polygon");
        assert_eq!(single.vertices().count(), 2);
    }
}
