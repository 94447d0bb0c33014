use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::debug;
use thiserror::Error;

use crate::model::{MIN_FIELDS, ModelError, TestDefinition};

/// 出力ファイルの先頭に書くフォーマットの説明
const HEADER: &str = "#format is: TestRef,TestDescription,Hostname,LocalIP:Port,LocalDescription[u],RemoteHost[u],RemoteIP:Port,RemoteDescription[u],Protocol(tcp,udp,tcp4 etc),Result[o],Summary[o]\n# [u] fields are currently unused, [o] are optional\n";

#[derive(Debug, Error)]
pub(crate) enum TestFileError {
    #[error("Failed to open {0}: {1}")]
    Open(PathBuf, #[source] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("Line {line}: expected at least 9 fields, but got {count}")]
    TooFewFields { line: u64, count: usize },
    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, #[source] io::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// テストファイルを読み込む
///
/// `my_host`と一致するホスト名を持つテストのみ実行対象になる
pub(crate) fn load(
    path: impl AsRef<Path>,
    my_host: &str,
) -> Result<Vec<TestDefinition>, TestFileError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TestFileError::Open(path.to_path_buf(), e))?;
    read_from(file, my_host)
}

pub(crate) fn read_from(
    reader: impl Read,
    my_host: &str,
) -> Result<Vec<TestDefinition>, TestFileError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut definitions = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let fields = record.iter().collect::<Vec<_>>();
        if fields.len() < MIN_FIELDS {
            return Err(TestFileError::TooFewFields {
                line,
                count: fields.len(),
            });
        }
        let definition = TestDefinition::from_record(&fields, my_host)?;
        debug!("Loaded {definition}");
        definitions.push(definition);
    }
    Ok(definitions)
}

/// 全てのテストの結果をファイルに書き出す
///
/// 出力はそのままテストファイルとして読み込める
pub(crate) fn write(
    path: impl AsRef<Path>,
    definitions: &[TestDefinition],
) -> Result<(), TestFileError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| TestFileError::Write(path.to_path_buf(), e))?;
    write_to(file, definitions).map_err(|e| match e {
        TestFileError::Csv(e) => TestFileError::Write(path.to_path_buf(), e.into()),
        e => e,
    })
}

pub(crate) fn write_to(
    mut writer: impl Write,
    definitions: &[TestDefinition],
) -> Result<(), TestFileError> {
    writer
        .write_all(HEADER.as_bytes())
        .map_err(csv::Error::from)?;

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(writer);
    for definition in definitions {
        writer.write_record(definition.to_record())?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::model::Verdict;

    const TESTS: &str = "\
# comment line
1,DNS lookup,lhost,,,ns1,10.0.0.53:53,name server,udp4
 2 , web farm , lhost , 10.0.0.1 ,,web,10.0.0.80:80-82,,tcp
3,other host,rhost,,,web,10.0.0.80:80,,tcp,PASSED,
";

    #[test]
    fn test_read_from() {
        // [正常系] コメント行を除いて読み込む
        let definitions = read_from(TESTS.as_bytes(), "lhost").unwrap();
        assert_eq!(definitions.len(), 3);

        assert_eq!(definitions[0].reference, "1");
        assert_eq!(definitions[0].remote_desc, "name server");
        assert!(definitions[0].attempt);

        // [正常系] 前後の空白は取り除かれる
        assert_eq!(definitions[1].reference, "2");
        assert_eq!(definitions[1].description, "web farm");
        assert_eq!(definitions[1].local_addr, "10.0.0.1:0");
        assert_eq!(definitions[1].sub_tests.len(), 3);

        // [正常系] 結果列付きの行も読み込める
        assert!(!definitions[2].attempt);
        assert_eq!(definitions[2].verdict, None);

        // [異常系] フィールド不足
        let result = read_from("1,short,lhost\n".as_bytes(), "lhost");
        assert!(matches!(
            result,
            Err(TestFileError::TooFewFields { line: 1, count: 3 })
        ));
    }

    #[test]
    fn test_load() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(TESTS.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        // [正常系] ファイルから読み込む
        let definitions = load(temp_file.path(), "rhost").unwrap();
        assert_eq!(definitions.len(), 3);
        assert_eq!(
            definitions.iter().filter(|d| d.attempt).count(),
            1
        );

        // [異常系] 存在しないファイル
        let result = load("/path/to/non/existent/tests.conchk", "lhost");
        assert!(matches!(result, Err(TestFileError::Open(_, _))));
    }

    #[test]
    fn test_write() {
        let mut definitions = read_from(TESTS.as_bytes(), "lhost").unwrap();
        definitions[0].verdict = Some(Verdict {
            passed: true,
            error: String::new(),
        });
        definitions[1].verdict = Some(Verdict {
            passed: false,
            error: "2.1 Connect error: dial 10.0.0.80:80: i/o timeout;".to_string(),
        });

        // [正常系] ヘッダーと11列のレコードを書き出す
        let mut out = Vec::new();
        write_to(&mut out, &definitions).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("#format is: TestRef,"));
        assert!(lines[1].starts_with("# [u] fields"));
        assert_eq!(
            lines[2],
            "1,DNS lookup,lhost,,,ns1,10.0.0.53:53,name server,udp4,PASSED,"
        );
        assert_eq!(
            lines[3],
            "2,web farm,lhost,10.0.0.1:0,,web,10.0.0.80:80-82,,tcp,FAILED,2.1 Connect error: dial 10.0.0.80:80: i/o timeout;"
        );
        assert_eq!(lines[4], "3,other host,rhost,,,web,10.0.0.80:80,,tcp,PENDING,");

        // [正常系] 書き出した結果はそのまま読み込める
        let temp_file = NamedTempFile::new().unwrap();
        write(temp_file.path(), &definitions).unwrap();
        let reloaded = load(temp_file.path(), "lhost").unwrap();
        assert_eq!(reloaded.len(), 3);
        for (reloaded, original) in reloaded.iter().zip(&definitions) {
            assert_eq!(reloaded.reference, original.reference);
            assert_eq!(reloaded.remote_addr, original.remote_addr);
            assert_eq!(reloaded.sub_tests.len(), original.sub_tests.len());
        }

        // [異常系] 書き込めないパス
        let result = write("/path/to/non/existent/out.csv", &definitions);
        assert!(matches!(result, Err(TestFileError::Write(_, _))));
    }
}
