use crate::layers::{Module, Pass};
use crate::math::tensor::Tensor;

/// Non-overlapping max pooling (kernel = stride). Trailing rows/columns that
/// do not fill a window are dropped.
#[derive(Debug)]
pub struct MaxPool2d {
    pub size: usize,
    // (input shape, flat input index of each output's maximum)
    cache: Option<(Vec<usize>, Vec<usize>)>,
}

impl MaxPool2d {
    pub fn new(size: usize) -> MaxPool2d {
        MaxPool2d { size, cache: None }
    }
}

impl Module for MaxPool2d {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        assert_eq!(input.rank(), 4, "MaxPool2d expects [B, C, H, W], got {:?}", input.shape);
        let (batch, channels, h, w) = (input.shape[0], input.shape[1], input.shape[2], input.shape[3]);
        let s = self.size;
        let (oh, ow) = (h / s, w / s);
        let mut out = Tensor::zeros(&[batch, channels, oh, ow]);
        let mut argmax = vec![0usize; out.numel()];

        for plane in 0..batch * channels {
            let base = plane * h * w;
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut best = base + (oy * s) * w + ox * s;
                    for dy in 0..s {
                        for dx in 0..s {
                            let idx = base + (oy * s + dy) * w + ox * s + dx;
                            if input.data[idx] > input.data[best] {
                                best = idx;
                            }
                        }
                    }
                    let o = (plane * oh + oy) * ow + ox;
                    out.data[o] = input.data[best];
                    argmax[o] = best;
                }
            }
        }

        if pass.is_training() {
            self.cache = Some((input.shape.clone(), argmax));
        }
        out
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let (shape, argmax) = self.cache.as_ref().expect("MaxPool2d::backward called without a training forward pass");
        let mut grad_input = Tensor::zeros(shape);
        for (o, &src) in argmax.iter().enumerate() {
            grad_input.data[src] += grad_output.data[o];
        }
        grad_input
    }
}

/// Averages each channel plane down to one value: `[B, C, H, W]` → `[B, C]`.
#[derive(Debug, Default)]
pub struct GlobalAvgPool {
    input_shape: Option<Vec<usize>>,
}

impl GlobalAvgPool {
    pub fn new() -> GlobalAvgPool {
        GlobalAvgPool::default()
    }
}

impl Module for GlobalAvgPool {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        assert_eq!(input.rank(), 4, "GlobalAvgPool expects [B, C, H, W], got {:?}", input.shape);
        let (batch, channels) = (input.shape[0], input.shape[1]);
        let plane = input.shape[2] * input.shape[3];
        let data = input
            .data
            .chunks(plane)
            .map(|p| p.iter().sum::<f64>() / plane as f64)
            .collect();

        if pass.is_training() {
            self.input_shape = Some(input.shape.clone());
        }
        Tensor::from_vec(&[batch, channels], data)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let shape = self.input_shape.as_ref().expect("GlobalAvgPool::backward called without a training forward pass");
        let plane = shape[2] * shape[3];
        let data = grad_output
            .data
            .iter()
            .flat_map(|&g| std::iter::repeat(g / plane as f64).take(plane))
            .collect();
        Tensor::from_vec(shape, data)
    }
}
