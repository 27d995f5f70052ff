//! 输入读取
//!
//! [`InputReader`] 打开一个只进、单次遍历的 [`ReadCursor`]，逐条产出 [`SourceMap`]。

use crate::error::{PipelineError, Result};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// 一条原始输入记录
pub type SourceMap = Map<String, Value>;

/// 只进游标
pub trait ReadCursor {
    /// 读取下一条记录，`None` 表示结束
    fn next(&mut self) -> Result<Option<SourceMap>>;
}

/// 输入源
pub trait InputReader {
    fn open(&mut self) -> Result<Box<dyn ReadCursor + '_>>;
}

/// 内存输入源
#[derive(Debug, Clone, Default)]
pub struct VecReader {
    records: Vec<SourceMap>,
}

impl VecReader {
    pub fn new(records: Vec<SourceMap>) -> Self {
        Self { records }
    }

    /// 从 JSON 值构建，非对象值报错
    pub fn from_values(values: Vec<Value>) -> Result<Self> {
        let records = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| match value {
                Value::Object(map) => Ok(map),
                other => Err(PipelineError::InvalidRecord {
                    line: i + 1,
                    message: format!("期望 JSON 对象，实际为 {}", other),
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct VecCursor<'a> {
    iter: std::slice::Iter<'a, SourceMap>,
}

impl ReadCursor for VecCursor<'_> {
    fn next(&mut self) -> Result<Option<SourceMap>> {
        Ok(self.iter.next().cloned())
    }
}

impl InputReader for VecReader {
    fn open(&mut self) -> Result<Box<dyn ReadCursor + '_>> {
        Ok(Box::new(VecCursor {
            iter: self.records.iter(),
        }))
    }
}

enum LinesSource {
    Path(PathBuf),
    Stream(Option<Box<dyn BufRead + Send>>),
}

/// JSON Lines 输入源：每行一个 JSON 对象，空行跳过
pub struct JsonLinesReader {
    source: LinesSource,
}

impl JsonLinesReader {
    /// 每次 `open` 都重新打开文件
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            source: LinesSource::Path(path.as_ref().to_path_buf()),
        }
    }

    /// 流只能被打开一次
    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            source: LinesSource::Stream(Some(Box::new(reader))),
        }
    }
}

impl InputReader for JsonLinesReader {
    fn open(&mut self) -> Result<Box<dyn ReadCursor + '_>> {
        let reader: Box<dyn BufRead + Send> = match &mut self.source {
            LinesSource::Path(path) => Box::new(BufReader::new(File::open(path)?)),
            LinesSource::Stream(stream) => stream
                .take()
                .ok_or_else(|| PipelineError::Configuration("输入流已被读取".to_string()))?,
        };

        Ok(Box::new(JsonLinesCursor {
            lines: reader.lines(),
            line: 0,
        }))
    }
}

struct JsonLinesCursor {
    lines: Lines<Box<dyn BufRead + Send>>,
    line: usize,
}

impl ReadCursor for JsonLinesCursor {
    fn next(&mut self) -> Result<Option<SourceMap>> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }

            let value: Value =
                serde_json::from_str(&line).map_err(|e| PipelineError::InvalidRecord {
                    line: self.line,
                    message: e.to_string(),
                })?;
            return match value {
                Value::Object(map) => Ok(Some(map)),
                other => Err(PipelineError::InvalidRecord {
                    line: self.line,
                    message: format!("期望 JSON 对象，实际为 {}", other),
                }),
            };
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Cursor, Write};

    fn drain(reader: &mut dyn InputReader) -> Result<Vec<SourceMap>> {
        let mut cursor = reader.open()?;
        let mut records = Vec::new();
        while let Some(record) = cursor.next()? {
            records.push(record);
        }
        Ok(records)
    }

    #[test]
    fn test_json_lines_skips_blank_lines() {
        let input = "{\"amount\": 1}\n\n   \n{\"amount\": 2}\n";
        let mut reader = JsonLinesReader::from_reader(Cursor::new(input.to_string()));
        let records = drain(&mut reader).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["amount"], json!(2));

        // 流不可重复打开
        assert!(reader.open().is_err());
    }

    #[test]
    fn test_json_lines_rejects_non_objects() {
        let input = "{\"amount\": 1}\n[1, 2]\n";
        let mut reader = JsonLinesReader::from_reader(Cursor::new(input.to_string()));
        let err = drain(&mut reader).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn test_json_lines_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"id\": \"a\"}}").unwrap();
        writeln!(file, "{{\"id\": \"b\"}}").unwrap();

        let mut reader = JsonLinesReader::from_path(file.path());
        assert_eq!(drain(&mut reader).unwrap().len(), 2);
        // 文件源可以重新打开
        assert_eq!(drain(&mut reader).unwrap().len(), 2);
    }

    #[test]
    fn test_vec_reader() {
        let mut reader = VecReader::from_values(vec![json!({"a": 1}), json!({"a": 2})]).unwrap();
        assert_eq!(drain(&mut reader).unwrap().len(), 2);
        assert!(VecReader::from_values(vec![json!(1)]).is_err());
    }
}
