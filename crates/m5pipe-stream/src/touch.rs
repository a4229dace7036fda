//! ページタッチ
//!
//! ホストはゲストのページフォルト処理を経由せずに生アドレスでゲストメモリを読み書きする。
//! 遅延マッピング・CoW・スワップアウトされたページをホストが触るとホスト側で
//! フォルトするため、トラップの前にゲスト自身がチャンク先頭と末尾のバイトに触れて
//! ページを常駐させておく。

/// ページを常駐させるためのバイトアクセス
pub trait PageToucher {
    /// 読み出してページを常駐させる（送信元）
    fn touch_readable(&self, byte: &u8);

    /// 0 を書き込んでページを書き込み可能な状態で常駐させる（受信先）
    fn touch_writable(&self, byte: &mut u8);
}

/// volatile アクセスによる実装（最適化で消されない）
#[derive(Debug, Clone, Copy, Default)]
pub struct VolatileToucher;

impl PageToucher for VolatileToucher {
    #[inline]
    fn touch_readable(&self, byte: &u8) {
        // SAFETY: 参照から作ったポインタなので有効
        let _ = unsafe { core::ptr::read_volatile(byte) };
    }

    #[inline]
    fn touch_writable(&self, byte: &mut u8) {
        // SAFETY: 同上
        unsafe { core::ptr::write_volatile(byte, 0) };
    }
}

impl<P: PageToucher + ?Sized> PageToucher for &P {
    fn touch_readable(&self, byte: &u8) {
        (**self).touch_readable(byte)
    }

    fn touch_writable(&self, byte: &mut u8) {
        (**self).touch_writable(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volatile_touch_writable_zeroes() {
        let mut buf = [0xAAu8; 4];
        VolatileToucher.touch_writable(&mut buf[3]);
        VolatileToucher.touch_readable(&buf[0]);
        assert_eq!(buf, [0xAA, 0xAA, 0xAA, 0x00]);
    }
}
