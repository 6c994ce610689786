use crate::layers::{forward_child, BatchNorm2d, Conv2d, Module, Param, Pass, Relu, Sequential};
use crate::math::tensor::Tensor;

/// ResNet basic block: two 3×3 conv + batch-norm stages with an identity
/// shortcut, or a 1×1 conv + batch-norm projection when the stride or channel
/// count changes.
pub struct ResidualBlock {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    relu1: Relu,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    downsample: Option<Sequential>,
    relu_out: Relu,
}

impl ResidualBlock {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize) -> ResidualBlock {
        let downsample = if stride != 1 || in_channels != out_channels {
            Some(
                Sequential::new()
                    .with("0", Conv2d::without_bias(in_channels, out_channels, 1, stride, 0))
                    .with("1", BatchNorm2d::new(out_channels)),
            )
        } else {
            None
        };
        ResidualBlock {
            conv1: Conv2d::without_bias(in_channels, out_channels, 3, stride, 1),
            bn1: BatchNorm2d::new(out_channels),
            relu1: Relu::new(),
            conv2: Conv2d::without_bias(out_channels, out_channels, 3, 1, 1),
            bn2: BatchNorm2d::new(out_channels),
            downsample,
            relu_out: Relu::new(),
        }
    }
}

impl Module for ResidualBlock {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        let mut main = forward_child(&mut self.conv1, "conv1", input, pass);
        main = forward_child(&mut self.bn1, "bn1", &main, pass);
        main = forward_child(&mut self.relu1, "relu", &main, pass);
        main = forward_child(&mut self.conv2, "conv2", &main, pass);
        main = forward_child(&mut self.bn2, "bn2", &main, pass);

        let shortcut = match self.downsample.as_mut() {
            Some(ds) => forward_child(ds, "downsample", input, pass),
            None => input.clone(),
        };
        main.add_assign(&shortcut);

        self.relu_out.forward(&main, pass)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let grad_sum = self.relu_out.backward(grad_output);

        let mut grad = self.bn2.backward(&grad_sum);
        grad = self.conv2.backward(&grad);
        grad = self.relu1.backward(&grad);
        grad = self.bn1.backward(&grad);
        let mut grad_input = self.conv1.backward(&grad);

        let grad_shortcut = match self.downsample.as_mut() {
            Some(ds) => ds.backward(&grad_sum),
            None => grad_sum,
        };
        grad_input.add_assign(&grad_shortcut);
        grad_input
    }

    fn collect_params<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Param)>) {
        self.conv1.collect_params(&format!("{}conv1.", prefix), out);
        self.bn1.collect_params(&format!("{}bn1.", prefix), out);
        self.conv2.collect_params(&format!("{}conv2.", prefix), out);
        self.bn2.collect_params(&format!("{}bn2.", prefix), out);
        if let Some(ds) = &self.downsample {
            ds.collect_params(&format!("{}downsample.", prefix), out);
        }
    }

    fn collect_params_mut<'a>(&'a mut self, prefix: &str, out: &mut Vec<(String, &'a mut Param)>) {
        self.conv1.collect_params_mut(&format!("{}conv1.", prefix), out);
        self.bn1.collect_params_mut(&format!("{}bn1.", prefix), out);
        self.conv2.collect_params_mut(&format!("{}conv2.", prefix), out);
        self.bn2.collect_params_mut(&format!("{}bn2.", prefix), out);
        if let Some(ds) = &mut self.downsample {
            ds.collect_params_mut(&format!("{}downsample.", prefix), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Mode;

    #[test]
    fn projection_block_changes_shape() {
        let mut block = ResidualBlock::new(4, 8, 2);
        let y = block.forward(&Tensor::zeros(&[2, 4, 7, 7]), &Pass::new(Mode::Train, None));
        assert_eq!(y.shape, vec![2, 8, 4, 4]);
        let g = block.backward(&Tensor::filled(&y.shape, 0.1));
        assert_eq!(g.shape, vec![2, 4, 7, 7]);
    }

    #[test]
    fn identity_block_names_parameters() {
        let block = ResidualBlock::new(4, 4, 1);
        let mut params = Vec::new();
        block.collect_params("layer1.0.", &mut params);
        assert!(params.iter().any(|(n, _)| n == "layer1.0.conv1.weight"));
        assert!(params.iter().any(|(n, _)| n == "layer1.0.bn2.running_var"));
        assert!(!params.iter().any(|(n, _)| n.contains("downsample")));
    }

    #[test]
    fn projection_block_has_downsample_parameters() {
        let block = ResidualBlock::new(4, 8, 2);
        let mut params = Vec::new();
        block.collect_params("", &mut params);
        assert!(params.iter().any(|(n, _)| n == "downsample.0.weight"));
        assert!(params.iter().any(|(n, _)| n == "downsample.1.weight"));
    }
}
