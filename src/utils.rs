use indicatif::ProgressStyle;

/// 余弦相似度，任一向量模长为 0 时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0. || nb == 0. {
        return 0.;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// 根据文件名生成图片来源地址
///
/// 文件名格式为 `<前缀>_<名称>.<扩展名>`，模板中的 `{name}` 会被替换为名称。
/// 例：`123_p_g_323.jpg` => `https://digi.ub.uni-heidelberg.de/diglit/p_g_323/0001/_image`
pub fn url_from_filename(filename: &str, template: &str) -> Option<String> {
    let (_, rest) = filename.split_once('_')?;
    let name = match rest.rsplit_once('.') {
        Some((name, _)) => name,
        None => rest,
    };
    if name.is_empty() {
        return None;
    }
    Some(template.replace("{name}", name))
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}
