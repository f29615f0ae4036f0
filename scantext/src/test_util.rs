use image::{Rgb, RgbImage};
use rten::model_builder::{ModelBuilder, ModelFormat, OpType};
use rten::ops::{MaxPool, Transpose};
use rten::{Dimension, Model};
use rten_imageproc::{Point, Rect};
use rten_tensor::{AsView, Tensor};

/// Generate a grid of uniformly sized and spaced rects.
///
/// `grid_shape` is a (rows, columns) tuple. `rect_size` and `gap_size` are
/// (height, width) tuples.
pub fn gen_rect_grid(
    top_left: Point,
    grid_shape: (i32, i32),
    rect_size: (i32, i32),
    gap_size: (i32, i32),
) -> Vec<Rect> {
    let mut rects = Vec::new();

    let (rows, cols) = grid_shape;
    let (rect_h, rect_w) = rect_size;
    let (gap_h, gap_w) = gap_size;

    for r in 0..rows {
        for c in 0..cols {
            let top = top_left.y + r * (rect_h + gap_h);
            let left = top_left.x + c * (rect_w + gap_w);
            rects.push(Rect::from_tlbr(top, left, top + rect_h, left + rect_w))
        }
    }

    rects
}

/// Generate a black RGB image with each rect in `rects` filled with `color`.
pub fn gen_test_image(width: u32, height: u32, rects: &[Rect], color: [u8; 3]) -> RgbImage {
    let mut image = RgbImage::new(width, height);
    for r in rects {
        for y in r.top().max(0)..r.bottom().min(height as i32) {
            for x in r.left().max(0)..r.right().min(width as i32) {
                image.put_pixel(x as u32, y as u32, Rgb(color));
            }
        }
    }
    image
}

/// Create a fake pixel classification model.
///
/// Takes an NCHW input with C=1 and the given fixed height and width, with
/// values in `[-0.5, 0.5]`, and adds a +0.5 bias to produce a "probability
/// map" in which white pixels score 1 and black pixels score 0.
pub fn fake_pixel_model(height: usize, width: usize) -> Model {
    let mut mb = ModelBuilder::new(ModelFormat::V1);
    let mut gb = mb.graph_builder();
    let input_id = gb.add_value(
        "input",
        Some(&[
            Dimension::Symbolic("batch".to_string()),
            Dimension::Fixed(1),
            Dimension::Fixed(height),
            Dimension::Fixed(width),
        ]),
        None,
    );
    gb.add_input(input_id);

    let output_id = gb.add_value("output", None, None);
    gb.add_output(output_id);

    let bias = Tensor::from_scalar(0.5);
    let bias_id = gb.add_constant(bias.view());
    gb.add_operator(
        "add",
        OpType::Add,
        &[Some(input_id), Some(bias_id)],
        &[output_id],
    );

    let graph = gb.finish();
    mb.set_graph(graph);
    let model_data = mb.finish();
    Model::load(model_data).unwrap()
}

/// Create a fake CTC text recognition model.
///
/// Takes an NCHW input with C=1 and a fixed height, and returns an output
/// with shape `[W / 4, N, height]`. Each column of the input is
/// re-interpreted as a vector of class scores, so the row index of the
/// brightest pixel in a column is the label predicted for it.
pub fn fake_recognition_model(height: usize) -> Model {
    let mut mb = ModelBuilder::new(ModelFormat::V1);
    let mut gb = mb.graph_builder();
    let input_id = gb.add_value(
        "input",
        Some(&[
            Dimension::Symbolic("batch".to_string()),
            Dimension::Fixed(1),
            Dimension::Fixed(height),
            Dimension::Symbolic("seq".to_string()),
        ]),
        None,
    );
    gb.add_input(input_id);

    // NCHW => NCH(W/4)
    let pool_out = gb.add_value("max_pool_out", None, None);
    gb.add_operator(
        "max_pool",
        OpType::MaxPool(MaxPool {
            kernel_size: [1, 4].into(),
            padding: [0, 0, 0, 0].into(),
            strides: [1, 4].into(),
        }),
        &[Some(input_id)],
        &[pool_out],
    );

    // NCH(W/4) => NH(W/4)
    let squeeze_axes = Tensor::from_vec(vec![1]);
    let squeeze_axes_id = gb.add_constant(squeeze_axes.view());
    let squeeze_out = gb.add_value("squeeze_out", None, None);
    gb.add_operator(
        "squeeze",
        OpType::Squeeze,
        &[Some(pool_out), Some(squeeze_axes_id)],
        &[squeeze_out],
    );

    // NH(W/4) => (W/4)NH
    let transpose_out = gb.add_value("transpose_out", None, None);
    gb.add_operator(
        "transpose",
        OpType::Transpose(Transpose {
            perm: Some(vec![2, 0, 1]),
        }),
        &[Some(squeeze_out)],
        &[transpose_out],
    );
    gb.add_output(transpose_out);

    let graph = gb.finish();
    mb.set_graph(graph);
    let model_data = mb.finish();
    Model::load(model_data).unwrap()
}
