pub mod dijkstra;

pub use dijkstra::find_path;
