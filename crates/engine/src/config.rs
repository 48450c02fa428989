use crate::graph::Point;
use crate::layout::{LayoutOptions, RankDir};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSize {
    pub width: f64,
    pub height: f64,
}

impl NodeSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Fixed column left of the graph holding database nodes in tree and
/// fragment-list mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseColumn {
    pub x: f64,
    pub start_y: f64,
    pub spacing: f64,
}

impl Default for DatabaseColumn {
    fn default() -> Self {
        Self { x: -600.0, start_y: 0.0, spacing: 250.0 }
    }
}

impl DatabaseColumn {
    /// Top-left position of the `index`-th database.
    pub fn position(&self, index: usize) -> Point {
        Point::new(self.x, self.start_y + index as f64 * self.spacing)
    }
}

/// Node sizes and layout parameters shared by every graph builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub fragment: NodeSize,
    pub database: NodeSize,
    pub output: NodeSize,
    pub query: NodeSize,
    /// Distance between the terminal fragment's far side and the Output node's center.
    pub output_gap: f64,
    pub plan_layout: LayoutOptions,
    pub tree_layout: LayoutOptions,
    pub fragment_layout: LayoutOptions,
    pub database_column: DatabaseColumn,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            fragment: NodeSize::new(280.0, 200.0),
            database: NodeSize::new(350.0, 200.0),
            output: NodeSize::new(280.0, 140.0),
            query: NodeSize::new(300.0, 160.0),
            output_gap: 200.0,
            plan_layout: LayoutOptions::new(RankDir::LeftRight, 60.0, 150.0),
            tree_layout: LayoutOptions::new(RankDir::LeftRight, 100.0, 200.0),
            fragment_layout: LayoutOptions::new(RankDir::LeftRight, 40.0, 120.0),
            database_column: DatabaseColumn::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: GraphConfig = serde_json::from_str(
            r#"{"output_gap": 120.0, "plan_layout": {"rank_dir": "TB"}, "database_column": {"x": -900.0}}"#,
        )
        .unwrap();
        assert_eq!(config.output_gap, 120.0);
        assert_eq!(config.plan_layout.rank_dir, RankDir::TopBottom);
        assert_eq!(config.plan_layout.node_sep, 60.0);
        assert_eq!(config.database_column.x, -900.0);
        assert_eq!(config.database_column.spacing, 250.0);
        assert_eq!(config.fragment, NodeSize::new(280.0, 200.0));
    }

    #[test]
    fn test_database_column_positions() {
        let column = DatabaseColumn::default();
        assert_eq!(column.position(0), Point::new(-600.0, 0.0));
        assert_eq!(column.position(2), Point::new(-600.0, 500.0));
    }
}
