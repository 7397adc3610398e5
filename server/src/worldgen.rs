//! One-shot world generation from a GeoJSON feature collection.
//!
//! Runs at startup when the countries table is empty. Each feature becomes
//! a country; its polygon outlines are projected onto the tile grid,
//! rasterised with Bresenham, filled with a scan-line pass, stamped as
//! ground tiles, and bulk-inserted. Border tiles are marked wherever a
//! 4-neighbour has a different owner or no tile at all.

use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

use log::{info, warn};
use serde_json::Value;

use shared::TileType;

use crate::persistence::Store;
use crate::world::{Country, Tile};

/// Grid dimensions the projection maps the globe onto.
pub const TILEMAP_WIDTH: i32 = 8192;
pub const TILEMAP_HEIGHT: i32 = 4096;

const DIRECTIONS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

type TileStore = HashMap<(i32, i32), Tile>;

/// Projects a GeoJSON `(lon, lat)` vertex onto the tile grid.
pub fn project(lon: f64, lat: f64) -> (i32, i32) {
    let lon = lon.clamp(-180.0, 180.0);
    let lat = lat.clamp(-90.0, 90.0);
    let x = (((lon + 180.0) / 360.0) * TILEMAP_WIDTH as f64).floor() as i32;
    let y = (((lat + 90.0) / 180.0) * TILEMAP_HEIGHT as f64).floor() as i32;
    (
        x.clamp(0, TILEMAP_WIDTH - 1),
        y.clamp(0, TILEMAP_HEIGHT - 1),
    )
}

fn stamp(tiles: &mut TileStore, x: i32, y: i32, country_id: u8) {
    tiles.insert(
        (x, y),
        Tile {
            x,
            y,
            owner_country_id: country_id,
            tile_type: TileType::Ground,
            prefab_id: None,
            is_border: false,
            occupier_country_id: None,
            occupied_at: None,
        },
    );
}

/// Bresenham rasterisation of one polygon edge.
pub fn draw_line(tiles: &mut TileStore, start: (i32, i32), end: (i32, i32), country_id: u8) {
    let (mut x0, mut y0) = start;
    let (x1, y1) = end;
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;

    loop {
        stamp(tiles, x0, y0, country_id);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x0 += sx;
        }
        if e2 < dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Scan-line interior fill.
pub fn fill_polygon(tiles: &mut TileStore, vertices: &[(i32, i32)], country_id: u8) {
    if vertices.len() < 3 {
        return;
    }

    let min_y = vertices.iter().map(|v| v.1).min().unwrap_or(0);
    let max_y = vertices.iter().map(|v| v.1).max().unwrap_or(0);

    for y in min_y..=max_y {
        let mut intersections = Vec::new();
        for i in 0..vertices.len() {
            let current = vertices[i];
            let next = vertices[(i + 1) % vertices.len()];
            if current.1 == next.1 {
                continue;
            }
            if (current.1 <= y && next.1 > y) || (next.1 <= y && current.1 > y) {
                let x = current.0 as f64
                    + (y - current.1) as f64 / (next.1 - current.1) as f64
                        * (next.0 - current.0) as f64;
                intersections.push(x.round() as i32);
            }
        }
        intersections.sort_unstable();

        for pair in intersections.chunks(2) {
            let [start, end] = pair else { break };
            for x in *start..=*end {
                stamp(tiles, x, y, country_id);
            }
        }
    }
}

fn rasterize_polygon(tiles: &mut TileStore, vertices: &[(i32, i32)], country_id: u8) {
    for i in 0..vertices.len() {
        let next = vertices[(i + 1) % vertices.len()];
        draw_line(tiles, vertices[i], next, country_id);
    }
    fill_polygon(tiles, vertices, country_id);
}

/// Marks every tile whose 4-neighbourhood crosses a country boundary or
/// runs off the generated landmass.
pub fn mark_borders(tiles: &mut TileStore) {
    let owners: HashMap<(i32, i32), u8> = tiles
        .iter()
        .map(|(key, tile)| (*key, tile.owner_country_id))
        .collect();

    for (&(x, y), tile) in tiles.iter_mut() {
        let is_border = DIRECTIONS.iter().any(|(dx, dy)| {
            match owners.get(&(x + dx, y + dy)) {
                Some(&owner) => owner != tile.owner_country_id,
                None => true,
            }
        });
        tile.is_border = is_border;
    }
}

/// ISO code for a feature, with the `ISO_A2_EH` fallback for features whose
/// primary code is the `-99` placeholder. `None` means the feature is
/// unusable and skipped.
fn country_code(properties: &Value) -> Option<String> {
    let primary = properties
        .get("ISO_A2")
        .and_then(Value::as_str)
        .unwrap_or("-99");
    let code = if primary == "-99" || primary.len() > 3 {
        properties
            .get("ISO_A2_EH")
            .and_then(Value::as_str)
            .unwrap_or("-99")
    } else {
        primary
    };
    (code != "-99").then(|| code.to_string())
}

/// Outer rings of a `Polygon` or `MultiPolygon` geometry, projected onto
/// the grid.
fn projected_rings(geometry: &Value) -> Vec<Vec<(i32, i32)>> {
    fn project_ring(ring: &Value) -> Vec<(i32, i32)> {
        ring.as_array()
            .map(|points| {
                points
                    .iter()
                    .filter_map(|point| {
                        let coords = point.as_array()?;
                        let lon = coords.first()?.as_f64()?;
                        let lat = coords.get(1)?.as_f64()?;
                        Some(project(lon, lat))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    let Some(coordinates) = geometry.get("coordinates") else {
        return Vec::new();
    };
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => coordinates
            .get(0)
            .map(|ring| vec![project_ring(ring)])
            .unwrap_or_default(),
        Some("MultiPolygon") => coordinates
            .as_array()
            .map(|polygons| {
                polygons
                    .iter()
                    .filter_map(|polygon| polygon.get(0))
                    .map(project_ring)
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Generates the world from a GeoJSON file and bulk-inserts the result.
pub async fn run(store: &Store, path: &Path) -> Result<(), Box<dyn Error>> {
    info!("generating world from {}", path.display());
    let content = tokio::fs::read_to_string(path).await?;
    let geo: Value = serde_json::from_str(&content)?;
    let features = geo
        .get("features")
        .and_then(Value::as_array)
        .ok_or("invalid geojson: no features array")?;

    let mut countries = Vec::new();
    let mut tiles: TileStore = HashMap::new();
    let mut next_id: u16 = 1;

    for feature in features {
        let Some(properties) = feature.get("properties") else {
            continue;
        };
        let Some(name) = properties.get("NAME").and_then(Value::as_str) else {
            continue;
        };
        let Some(code) = country_code(properties) else {
            info!("skipping feature {} with no usable ISO code", name);
            continue;
        };
        if next_id > u8::MAX as u16 {
            warn!("country id space exhausted, skipping remaining features");
            break;
        }
        let id = next_id as u8;
        next_id += 1;

        info!("rasterising {} ({})", name, code);
        countries.push(Country {
            id,
            name: name.to_string(),
            code,
            is_ai_controlled: false,
        });

        if let Some(geometry) = feature.get("geometry") {
            for ring in projected_rings(geometry) {
                rasterize_polygon(&mut tiles, &ring, id);
            }
        }
    }

    mark_borders(&mut tiles);

    let border_count = tiles.values().filter(|t| t.is_border).count();
    info!(
        "generated {} countries, {} tiles ({} border)",
        countries.len(),
        tiles.len(),
        border_count
    );

    store.insert_countries(&countries).await?;
    let all_tiles: Vec<Tile> = tiles.into_values().collect();
    store.save_tiles(&all_tiles).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_corners() {
        assert_eq!(project(-180.0, -90.0), (0, 0));
        assert_eq!(project(0.0, 0.0), (4096, 2048));
        // The far corner clamps back onto the grid.
        assert_eq!(project(180.0, 90.0), (TILEMAP_WIDTH - 1, TILEMAP_HEIGHT - 1));
    }

    #[test]
    fn test_projection_clamps_out_of_range_input() {
        assert_eq!(project(-500.0, -200.0), (0, 0));
        assert_eq!(project(500.0, 200.0), (TILEMAP_WIDTH - 1, TILEMAP_HEIGHT - 1));
    }

    #[test]
    fn test_draw_line_horizontal() {
        let mut tiles = TileStore::new();
        draw_line(&mut tiles, (0, 0), (4, 0), 1);
        for x in 0..=4 {
            assert!(tiles.contains_key(&(x, 0)), "missing ({}, 0)", x);
        }
        assert_eq!(tiles.len(), 5);
    }

    #[test]
    fn test_draw_line_diagonal_is_connected() {
        let mut tiles = TileStore::new();
        draw_line(&mut tiles, (0, 0), (5, 3), 1);
        assert!(tiles.contains_key(&(0, 0)));
        assert!(tiles.contains_key(&(5, 3)));
        // A Bresenham line covers max(dx, dy) + 1 cells.
        assert_eq!(tiles.len(), 6);
    }

    #[test]
    fn test_fill_square_polygon() {
        let mut tiles = TileStore::new();
        let square = [(0, 0), (10, 0), (10, 10), (0, 10)];
        rasterize_polygon(&mut tiles, &square, 2);

        // Interior is filled.
        assert!(tiles.contains_key(&(5, 5)));
        // Everything inside the square, nothing outside.
        assert_eq!(tiles.len(), 11 * 11);
        assert!(!tiles.contains_key(&(11, 5)));
        for tile in tiles.values() {
            assert_eq!(tile.owner_country_id, 2);
            assert_eq!(tile.tile_type, TileType::Ground);
        }
    }

    #[test]
    fn test_degenerate_polygon_ignored_by_fill() {
        let mut tiles = TileStore::new();
        fill_polygon(&mut tiles, &[(0, 0), (5, 5)], 1);
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_mark_borders_on_landmass_edge() {
        let mut tiles = TileStore::new();
        let square = [(0, 0), (4, 0), (4, 4), (0, 4)];
        rasterize_polygon(&mut tiles, &square, 1);
        mark_borders(&mut tiles);

        // Center is interior, edge touches the void.
        assert!(!tiles[&(2, 2)].is_border);
        assert!(tiles[&(0, 0)].is_border);
        assert!(tiles[&(4, 2)].is_border);
    }

    #[test]
    fn test_mark_borders_between_countries() {
        let mut tiles = TileStore::new();
        rasterize_polygon(&mut tiles, &[(0, 0), (4, 0), (4, 4), (0, 4)], 1);
        rasterize_polygon(&mut tiles, &[(5, 0), (9, 0), (9, 4), (5, 4)], 2);
        mark_borders(&mut tiles);

        // Tiles along the x=4/x=5 seam face a different owner.
        assert!(tiles[&(4, 2)].is_border);
        assert!(tiles[&(5, 2)].is_border);
        assert!(!tiles[&(2, 2)].is_border);
        assert!(!tiles[&(7, 2)].is_border);
    }

    #[test]
    fn test_country_code_fallback() {
        let properties = serde_json::json!({ "ISO_A2": "NO" });
        assert_eq!(country_code(&properties), Some("NO".to_string()));

        let fallback = serde_json::json!({ "ISO_A2": "-99", "ISO_A2_EH": "FR" });
        assert_eq!(country_code(&fallback), Some("FR".to_string()));

        let unusable = serde_json::json!({ "ISO_A2": "-99", "ISO_A2_EH": "-99" });
        assert_eq!(country_code(&unusable), None);
    }

    #[test]
    fn test_projected_rings_polygon_and_multipolygon() {
        let polygon = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]]
        });
        let rings = projected_rings(&polygon);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0][0], (4096, 2048));

        let multi = serde_json::json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]],
                [[[10.0, 10.0], [11.0, 10.0], [11.0, 11.0]]]
            ]
        });
        assert_eq!(projected_rings(&multi).len(), 2);
    }
}
