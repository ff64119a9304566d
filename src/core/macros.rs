//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use voxel_script::impl_default;
///
/// struct Limits {
///     memory: usize,
///     label: String,
/// }
///
/// impl_default!(Limits {
///     memory: 0,
///     label: String::new(),
/// });
///
/// assert_eq!(Limits::default().memory, 0);
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
