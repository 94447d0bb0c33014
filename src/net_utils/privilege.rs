use nix::unistd::{Uid, gethostname};

/// rawソケットを開く権限があるか
///
/// 実効UIDがrootの場合のみ真
pub(crate) fn has_raw_socket_privilege() -> bool {
    Uid::effective().is_root()
}

/// このホストのホスト名
///
/// 取得できない場合は空文字列
pub(crate) fn hostname() -> String {
    gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}
