//! MTR route and station layers drawn on top of the base map.

use std::collections::BTreeMap;

use serde_json::{json, Value};

pub const ROUTES_SOURCE: &str = "mtr-routes";
pub const STATIONS_SOURCE: &str = "mtr-stations";
pub const INTERCHANGES_SOURCE: &str = "mtr-interchange-stations";

/// Station ring color when a station's line is unknown.
pub const FALLBACK_STATION_COLOR: &str = "#808080";

/// Radius stops (zoom, px) for the colored outer ring of a station.
const STATION_OUTER_STOPS: [(f64, f64); 6] = [
    (10.0, 3.6),
    (13.0, 7.2),
    (16.0, 14.4),
    (19.0, 24.0),
    (22.0, 31.2),
    (24.0, 38.4),
];
const STATION_INNER_STOPS: [(f64, f64); 6] = [
    (10.0, 1.8),
    (13.0, 3.6),
    (16.0, 7.2),
    (19.0, 12.0),
    (22.0, 15.6),
    (24.0, 19.2),
];
const INTERCHANGE_OUTER_SCALE: f64 = 1.08;
const INTERCHANGE_INNER_SCALE: f64 = 1.4;

/// Maps `line_name` to `color` over the route features.
pub fn line_color_map(routes: &Value) -> BTreeMap<String, String> {
    let Some(features) = routes.get("features").and_then(Value::as_array) else {
        return BTreeMap::new();
    };

    features
        .iter()
        .filter_map(|feature| {
            let props = feature.get("properties")?;
            let name = props.get("line_name")?.as_str()?;
            let color = props.get("color")?.as_str()?;
            Some((name.to_string(), color.to_string()))
        })
        .collect()
}

/// `match` expression coloring a station by its first line.
///
/// `lines` is a string for single-line stations and an array for
/// interchanges, hence the `coalesce`. With no known lines the expression
/// degenerates to the fallback color, since `match` needs at least one arm.
pub fn station_color_expression(colors: &BTreeMap<String, String>) -> Value {
    if colors.is_empty() {
        return json!(FALLBACK_STATION_COLOR);
    }

    let mut expression = vec![
        json!("match"),
        json!(["coalesce", ["at", 0, ["get", "lines"]], ["get", "lines"]]),
    ];
    for (line, color) in colors {
        expression.push(json!(line));
        expression.push(json!(color));
    }
    expression.push(json!(FALLBACK_STATION_COLOR));
    Value::Array(expression)
}

fn interpolate_by_zoom(stops: &[(f64, f64)], scale: f64) -> Value {
    let mut expression = vec![json!("interpolate"), json!(["linear"]), json!(["zoom"])];
    for (zoom, value) in stops {
        expression.push(json!(zoom));
        expression.push(json!(value * scale));
    }
    Value::Array(expression)
}

/// The six transit layers, bottom to top.
pub fn transit_layers(colors: &BTreeMap<String, String>) -> Vec<Value> {
    let line_layout = json!({ "line-cap": "round", "line-join": "round" });

    vec![
        json!({
            "id": "mtr-routes-casing",
            "type": "line",
            "source": ROUTES_SOURCE,
            "paint": {
                "line-width": interpolate_by_zoom(&[(10.0, 2.5), (14.0, 8.0)], 1.0),
                "line-color": "#fff",
                "line-opacity": 0.8
            },
            "layout": line_layout.clone()
        }),
        json!({
            "id": "mtr-routes-line",
            "type": "line",
            "source": ROUTES_SOURCE,
            "paint": {
                "line-width": interpolate_by_zoom(&[(10.0, 2.0), (14.0, 4.0), (24.0, 15.0)], 1.0),
                "line-color": ["get", "color"],
                "line-opacity": 1
            },
            "layout": line_layout
        }),
        json!({
            "id": "mtr-stations-outer",
            "type": "circle",
            "source": STATIONS_SOURCE,
            "paint": {
                "circle-radius": interpolate_by_zoom(&STATION_OUTER_STOPS, 1.0),
                "circle-color": station_color_expression(colors)
            }
        }),
        json!({
            "id": "mtr-interchange-stations-outer",
            "type": "circle",
            "source": INTERCHANGES_SOURCE,
            "paint": {
                "circle-radius": interpolate_by_zoom(&STATION_OUTER_STOPS, INTERCHANGE_OUTER_SCALE),
                "circle-color": "#000"
            }
        }),
        json!({
            "id": "mtr-stations-inner",
            "type": "circle",
            "source": STATIONS_SOURCE,
            "paint": {
                "circle-radius": interpolate_by_zoom(&STATION_INNER_STOPS, 1.0),
                "circle-color": "#fff"
            }
        }),
        json!({
            "id": "mtr-interchange-stations-inner",
            "type": "circle",
            "source": INTERCHANGES_SOURCE,
            "paint": {
                "circle-radius": interpolate_by_zoom(&STATION_INNER_STOPS, INTERCHANGE_INNER_SCALE),
                "circle-color": "#fff"
            }
        }),
    ]
}
