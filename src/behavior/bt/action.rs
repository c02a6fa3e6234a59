use crate::behavior::bt::*;

type ActionCallback<T> = fn(&mut Box<T>) -> BTResult;

pub struct BTAction<T> {
    name: String,
    callback: ActionCallback<T>,
}

impl<T> BTAction<T> {
    pub fn new(name: &str, callback: ActionCallback<T>) -> BTAction<T> {
        BTAction {
            name: name.to_owned(),
            callback,
        }
    }
}

impl<T> BTNode<T> for BTAction<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, blackboard: &mut Box<T>) -> BTResult {
        (self.callback)(blackboard)
    }
}
