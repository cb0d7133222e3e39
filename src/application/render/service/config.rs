use comrak::options::Options;

pub(crate) fn default_options() -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options);
    options
}

fn configure_extensions(options: &mut Options<'static>) {
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = false;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.superscript = false;
    ext.math_dollars = false;
    ext.math_code = false;

    options.parse.smart = true;

    let render = &mut options.render;
    render.hardbreaks = true;
    render.github_pre_lang = false;
    render.r#unsafe = true;
    render.sourcepos = false;
}
