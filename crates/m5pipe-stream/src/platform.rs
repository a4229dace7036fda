//! 実行環境への問い合わせ

/// sysconf が使えない環境でのページサイズ
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// 実行環境のページサイズ
#[cfg(unix)]
pub fn page_size() -> usize {
    // SAFETY: sysconf は副作用のない問い合わせ
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
pub fn page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

/// RLIMIT_MEMLOCK の (soft, hard)
#[cfg(unix)]
pub fn memlock_limit() -> Option<(u64, u64)> {
    let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    // SAFETY: limit は有効な書き込み先
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut limit) };
    if rc == 0 {
        Some((limit.rlim_cur as u64, limit.rlim_max as u64))
    } else {
        None
    }
}

#[cfg(not(unix))]
pub fn memlock_limit() -> Option<(u64, u64)> {
    None
}
