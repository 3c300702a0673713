//! 航点文件
//!
//! CSV，第一行为表头，每行前两列为 `x,y`（米），其余列忽略。

use crate::ConfigError;
use std::fs;
use std::path::Path;

/// 解析航点文本
pub fn parse_waypoints(content: &str) -> Result<Vec<(f64, f64)>, ConfigError> {
    let mut waypoints = Vec::new();

    for (index, line) in content.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut columns = line.split(',').map(str::trim);
        let mut next = |name: &str| -> Result<f64, ConfigError> {
            let raw = columns.next().unwrap_or_default();
            raw.parse::<f64>().map_err(|_| ConfigError::Waypoint {
                line: index + 1,
                message: format!("invalid {} value {:?}", name, raw),
            })
        };
        let x = next("x")?;
        let y = next("y")?;
        waypoints.push((x, y));
    }

    Ok(waypoints)
}

/// 读取航点文件
pub fn load_waypoints(path: &Path) -> Result<Vec<(f64, f64)>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let waypoints = parse_waypoints(&content)?;
    tracing::info!("Loaded {} waypoints from {}", waypoints.len(), path.display());
    Ok(waypoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_header_and_extra_columns() {
        let content = "x,y,heading\n0.0,0.5,0.1\n1.0, 1.5 ,0.2\n\n2.0,2.5\n";
        let waypoints = parse_waypoints(content).unwrap();
        assert_eq!(waypoints, vec![(0.0, 0.5), (1.0, 1.5), (2.0, 2.5)]);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let content = "x,y\n0,0\n1,abc\n";
        match parse_waypoints(content) {
            Err(ConfigError::Waypoint { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(parse_waypoints("x,y\n5\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "x,y\n0.1,0.2\n").unwrap();
        assert_eq!(load_waypoints(file.path()).unwrap(), vec![(0.1, 0.2)]);
    }
}
