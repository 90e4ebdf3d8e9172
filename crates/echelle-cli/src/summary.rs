use console::Style;
use echelle_core::continuum::{BasisFunction, ContinuumConfig};
use echelle_core::pipeline::{PipelineConfig, PipelineSummary};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn format_ranges(ranges: &[(f64, f64)]) -> String {
    ranges
        .iter()
        .map(|(lo, hi)| format!("{lo}-{hi}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_pipeline_summary(config: &PipelineConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Echelle Pipeline"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(16)));
    println!();

    for (i, path) in config.spectrum_paths.iter().enumerate() {
        let label = if i == 0 { "Input" } else { "" };
        println!("  {:<14}{}", s.label.apply_to(label), s.path.apply_to(path.display()));
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.display())
    );
    println!();

    if let Some(ref norm) = config.normalization {
        println!("  {}", s.header.apply_to("Normalization"));
        if norm.blue_trim > 0 || norm.red_trim > 0 {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Trim"),
                s.value.apply_to(format!("{} / {} px", norm.blue_trim, norm.red_trim))
            );
        }
        print_continuum_section(&s, &norm.continuum);
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Normalization"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Stitching"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(config.stitch.method)
    );
    println!();
}

fn print_continuum_section(s: &Styles, continuum: &ContinuumConfig) {
    println!(
        "    {:<12}{}",
        s.label.apply_to("Function"),
        s.method.apply_to(continuum.function)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Order"),
        s.value.apply_to(continuum.order)
    );
    if continuum.function == BasisFunction::Spline {
        match continuum.knot_spacing {
            Some(spacing) if spacing > 0.0 => println!(
                "    {:<12}{}",
                s.label.apply_to("Knots"),
                s.value.apply_to(format!("every {spacing}"))
            ),
            _ => println!(
                "    {:<12}{}",
                s.label.apply_to("Knots"),
                s.disabled.apply_to("none")
            ),
        }
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Clip"),
        s.value.apply_to(format!(
            "-{} / +{} sigma, {} iterations",
            continuum.low_sigma_clip, continuum.high_sigma_clip, continuum.max_iterations
        ))
    );
    if !continuum.exclude.is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Exclude"),
            s.value.apply_to(format_ranges(&continuum.exclude))
        );
    }
    if !continuum.include.is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Include"),
            s.value.apply_to(format_ranges(&continuum.include))
        );
    }
}

pub fn print_run_result(summary: &PipelineSummary) {
    let s = Styles::new();

    println!();
    for input in &summary.inputs {
        println!(
            "  {:<14}{} order(s) via {}",
            s.label.apply_to(input.path.display()),
            s.value.apply_to(input.orders),
            s.method.apply_to(input.strategy)
        );
    }
    println!(
        "  {:<14}{} of {}",
        s.label.apply_to("Stitched"),
        s.value.apply_to(summary.orders_stitched),
        summary.orders_read
    );
    if summary.failed_fits > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Fit failures"),
            s.disabled.apply_to(summary.failed_fits)
        );
    }
    if let Some((lo, hi)) = summary.wavelength_range {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Range"),
            s.value.apply_to(format!("{lo:.3} - {hi:.3} ({} points)", summary.output_points))
        );
    }
    println!(
        "  {:<14}{} ({})",
        s.label.apply_to("Output"),
        s.path.apply_to(summary.output.display()),
        summary.output_format
    );
    println!();
}
