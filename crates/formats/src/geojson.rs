use foundation::GeoPoint;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum GeoJsonGeometry {
    Point(GeoPoint),
    MultiPoint(Vec<GeoPoint>),
    LineString(Vec<GeoPoint>),
    MultiLineString(Vec<Vec<GeoPoint>>),
    Polygon(Vec<Vec<GeoPoint>>),
    MultiPolygon(Vec<Vec<Vec<GeoPoint>>>),
}

impl GeoJsonGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            GeoJsonGeometry::Point(_) => "Point",
            GeoJsonGeometry::MultiPoint(_) => "MultiPoint",
            GeoJsonGeometry::LineString(_) => "LineString",
            GeoJsonGeometry::MultiLineString(_) => "MultiLineString",
            GeoJsonGeometry::Polygon(_) => "Polygon",
            GeoJsonGeometry::MultiPolygon(_) => "MultiPolygon",
        }
    }
}

/// One GeoJSON `Feature`. `geometry` is `None` for `"geometry": null`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonFeature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: Option<GeoJsonGeometry>,
}

impl GeoJsonFeature {
    /// String form of a property; numbers are rendered in decimal.
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A decoded `FeatureCollection`.
///
/// Features that fail to parse do not fail the collection: they are kept in
/// `rejected` as `(source index, reason)` pairs, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoJsonCollection {
    pub features: Vec<GeoJsonFeature>,
    pub rejected: Vec<(usize, String)>,
}

#[derive(Debug)]
pub enum GeoJsonError {
    Json(serde_json::Error),
    NotAFeatureCollection,
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::Json(e) => write!(f, "JSON parse error: {e}"),
            GeoJsonError::NotAFeatureCollection => {
                write!(f, "expected GeoJSON FeatureCollection")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

impl GeoJsonCollection {
    pub fn from_slice(payload: &[u8]) -> Result<Self, GeoJsonError> {
        let value: Value = serde_json::from_slice(payload).map_err(GeoJsonError::Json)?;
        Self::from_value(value)
    }

    pub fn parse_str(payload: &str) -> Result<Self, GeoJsonError> {
        Self::from_slice(payload.as_bytes())
    }

    pub fn from_value(value: Value) -> Result<Self, GeoJsonError> {
        let obj = value.as_object().ok_or(GeoJsonError::NotAFeatureCollection)?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(GeoJsonError::NotAFeatureCollection)?;
        if ty != "FeatureCollection" {
            return Err(GeoJsonError::NotAFeatureCollection);
        }

        let features_val = obj
            .get("features")
            .and_then(|v| v.as_array())
            .ok_or(GeoJsonError::NotAFeatureCollection)?;

        let mut features = Vec::with_capacity(features_val.len());
        let mut rejected = Vec::new();
        for (index, feat_val) in features_val.iter().enumerate() {
            match parse_feature(feat_val) {
                Ok(feature) => features.push(feature),
                Err(reason) => rejected.push((index, reason)),
            }
        }

        Ok(Self { features, rejected })
    }

    /// Every source feature in source order, parsed or not.
    pub fn entries(&self) -> impl Iterator<Item = (usize, Result<&GeoJsonFeature, &str>)> + '_ {
        let total = self.features.len() + self.rejected.len();
        let mut features = self.features.iter();
        let mut rejected = self.rejected.iter().peekable();
        (0..total).filter_map(move |index| {
            if rejected.peek().map(|(i, _)| *i) == Some(index) {
                rejected.next().map(|(_, reason)| (index, Err(reason.as_str())))
            } else {
                features.next().map(|f| (index, Ok(f)))
            }
        })
    }

    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "type".to_string(),
            Value::String("FeatureCollection".to_string()),
        );
        let features = self.features.iter().map(feature_to_value).collect();
        root.insert("features".to_string(), Value::Array(features));
        Value::Object(root)
    }

    pub fn to_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_value())
    }
}

fn parse_feature(value: &Value) -> Result<GeoJsonFeature, String> {
    let obj = value
        .as_object()
        .ok_or("feature must be an object".to_string())?;

    let feat_type = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("feature missing type".to_string())?;
    if feat_type != "Feature" {
        return Err(format!("unexpected feature type: {feat_type}"));
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let properties = obj
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let geometry = match obj.get("geometry") {
        None => return Err("feature missing geometry".to_string()),
        Some(Value::Null) => None,
        Some(g) => Some(parse_geometry(g)?),
    };

    Ok(GeoJsonFeature {
        id,
        properties,
        geometry,
    })
}

fn feature_to_value(feat: &GeoJsonFeature) -> Value {
    let mut fobj = Map::new();
    fobj.insert("type".to_string(), Value::String("Feature".to_string()));
    if let Some(id) = &feat.id {
        fobj.insert("id".to_string(), Value::String(id.clone()));
    }
    fobj.insert(
        "properties".to_string(),
        Value::Object(feat.properties.clone()),
    );
    let geometry = feat
        .geometry
        .as_ref()
        .map(geometry_to_value)
        .unwrap_or(Value::Null);
    fobj.insert("geometry".to_string(), geometry);
    Value::Object(fobj)
}

/// Encodes a geometry as a GeoJSON geometry object.
pub fn geometry_to_value(geom: &GeoJsonGeometry) -> Value {
    let coords = match geom {
        GeoJsonGeometry::Point(p) => point_coords(p),
        GeoJsonGeometry::MultiPoint(ps) | GeoJsonGeometry::LineString(ps) => ring_coords(ps),
        GeoJsonGeometry::MultiLineString(rings) | GeoJsonGeometry::Polygon(rings) => {
            Value::Array(rings.iter().map(|r| ring_coords(r)).collect())
        }
        GeoJsonGeometry::MultiPolygon(polys) => Value::Array(
            polys
                .iter()
                .map(|poly| Value::Array(poly.iter().map(|r| ring_coords(r)).collect()))
                .collect(),
        ),
    };
    let mut obj = Map::new();
    obj.insert(
        "type".to_string(),
        Value::String(geom.type_name().to_string()),
    );
    obj.insert("coordinates".to_string(), coords);
    Value::Object(obj)
}

fn point_coords(p: &GeoPoint) -> Value {
    Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)])
}

fn ring_coords(ps: &[GeoPoint]) -> Value {
    Value::Array(ps.iter().map(point_coords).collect())
}

fn parse_geometry(value: &Value) -> Result<GeoJsonGeometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(GeoJsonGeometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(GeoJsonGeometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(GeoJsonGeometry::LineString(parse_points(coords)?)),
        "MultiLineString" => Ok(GeoJsonGeometry::MultiLineString(parse_rings(coords)?)),
        "Polygon" => Ok(GeoJsonGeometry::Polygon(parse_rings(coords)?)),
        "MultiPolygon" => Ok(GeoJsonGeometry::MultiPolygon(parse_multi_polygon(coords)?)),
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or("position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have [lon, lat]".to_string());
    }
    let lon = arr[0].as_f64().ok_or("lon must be a number".to_string())?;
    let lat = arr[1].as_f64().ok_or("lat must be a number".to_string())?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(parse_point).collect()
}

fn parse_rings(coords: &Value) -> Result<Vec<Vec<GeoPoint>>, String> {
    let rings = coords
        .as_array()
        .ok_or("coordinates must be an array of rings".to_string())?;
    rings.iter().map(parse_points).collect()
}

fn parse_multi_polygon(coords: &Value) -> Result<Vec<Vec<Vec<GeoPoint>>>, String> {
    let polys = coords
        .as_array()
        .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
    polys.iter().map(parse_rings).collect()
}

#[cfg(test)]
mod tests {
    use super::{GeoJsonCollection, GeoJsonError, GeoJsonGeometry};
    use serde_json::json;

    #[test]
    fn parses_polygons_and_points() {
        let payload = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": 7,
                    "properties": { "name": "Istra", "code": 18 },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[13.5, 45.0], [14.2, 45.0], [14.2, 45.5], [13.5, 45.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "name": "Pula" },
                    "geometry": { "type": "Point", "coordinates": [13.85, 44.87] }
                }
            ]
        });
        let c = GeoJsonCollection::from_value(payload).unwrap();
        assert_eq!(c.features.len(), 2);
        assert_eq!(c.features[0].id.as_deref(), Some("7"));
        assert_eq!(c.features[0].property_str("code").as_deref(), Some("18"));
        assert!(matches!(
            c.features[0].geometry,
            Some(GeoJsonGeometry::Polygon(_))
        ));
        assert!(matches!(
            c.features[1].geometry,
            Some(GeoJsonGeometry::Point(_))
        ));
    }

    #[test]
    fn null_geometry_is_kept_as_none() {
        let c = GeoJsonCollection::parse_str(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},"geometry":null}]}"#,
        )
        .unwrap();
        assert_eq!(c.features[0].geometry, None);
    }

    #[test]
    fn rejects_non_collections() {
        let err = GeoJsonCollection::parse_str(r#"{"type":"Feature"}"#).unwrap_err();
        assert!(matches!(err, GeoJsonError::NotAFeatureCollection));

        let err = GeoJsonCollection::parse_str("not json").unwrap_err();
        assert!(matches!(err, GeoJsonError::Json(_)));
    }

    #[test]
    fn bad_features_are_set_aside_not_fatal() {
        let c = GeoJsonCollection::parse_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1,2]}},
                {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1]}},
                {"type":"Feature","properties":{},"geometry":{"type":"GeometryCollection","geometries":[]}},
                {"type":"Feature","properties":{}},
                {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[3,4]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(c.features.len(), 2);
        let rejected: Vec<usize> = c.rejected.iter().map(|(i, _)| *i).collect();
        assert_eq!(rejected, vec![1, 2, 3]);

        let order: Vec<(usize, bool)> = c.entries().map(|(i, e)| (i, e.is_ok())).collect();
        assert_eq!(
            order,
            vec![(0, true), (1, false), (2, false), (3, false), (4, true)]
        );
    }

    #[test]
    fn exported_value_parses_back() {
        let src = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"a","properties":{"name":"A"},
             "geometry":{"type":"MultiPolygon","coordinates":[[[[0,0],[1,0],[1,1],[0,0]]]]}}
        ]}"#;
        let c = GeoJsonCollection::parse_str(src).unwrap();
        let again = GeoJsonCollection::from_value(c.to_value()).unwrap();
        assert_eq!(c, again);
    }
}
