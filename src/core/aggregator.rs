use crate::model::{SubTest, Verdict};

/// 全てのSubTestの結果からテスト定義の合否を決める
///
/// - SubTestが1つの場合はそれが成功したかどうか
/// - ポート範囲の場合は、拒否以外の失敗が1つもなく、かつ1つ以上成功していれば合格。
///   拒否以外の失敗は`"<sub ref> <error>;"`の形でエラー文に連結する。
pub(crate) fn aggregate(sub_tests: &[SubTest]) -> Verdict {
    if let [single] = sub_tests {
        return Verdict {
            passed: single.passed(),
            error: single.error_text(),
        };
    }

    let mut error = String::new();
    let mut failed = false;
    let mut one_passed = false;
    for sub_test in sub_tests {
        if sub_test.passed() {
            one_passed = true;
        } else if !sub_test.refused() {
            failed = true;
            error.push_str(&format!(
                "{} {};",
                sub_test.sub_ref.as_deref().unwrap_or_default(),
                sub_test.error_text()
            ));
        }
    }

    // 全て拒否された範囲は疎通の証拠にならない
    Verdict {
        passed: !failed && one_passed,
        error,
    }
}
