/// An IRQ driven serial port
///
pub mod uart1 {
    use crate::hal::gpio::gpioa::{PA10, PA9};
    use crate::hal::gpio::{Alternate, Floating, Input, PushPull};
    use crate::hal::pac;
    use crate::hal::pac::interrupt;
    use crate::hal::serial::{Rx, Serial, Tx};
    use embedded_hal::serial::{Read, Write};
    use heapless::spsc::{Consumer, Producer, Queue};

    const TX_Q_SIZE: usize = 128;
    const RX_Q_SIZE: usize = 16;

    static mut TX_Q_CONSUMER: Option<Consumer<u8, TX_Q_SIZE>> = None;
    static mut TX_Q_PRODUCER: Option<Producer<u8, TX_Q_SIZE>> = None;
    static mut RX_Q_CONSUMER: Option<Consumer<u8, RX_Q_SIZE>> = None;
    static mut RX_Q_PRODUCER: Option<Producer<u8, RX_Q_SIZE>> = None;

    type TxPinType = PA9<Alternate<PushPull>>;
    type RxPinType = PA10<Input<Floating>>;
    static mut TX: Option<Tx<pac::USART1>> = None;
    static mut RX: Option<Rx<pac::USART1>> = None;

    pub struct Uart1Tx {}

    impl core::fmt::Write for Uart1Tx {
        fn write_str(&mut self, s: &str) -> Result<(), core::fmt::Error> {
            for b in s.bytes() {
                write_byte(b);
            }
            Ok(())
        }
    }

    /// Must be called once during application initialization
    pub fn init(serial: Serial<pac::USART1, (TxPinType, RxPinType)>, irq_prio: u8) {
        let core = unsafe { pac::CorePeripherals::steal() };
        let mut nvic = core.NVIC;

        let (tx, rx) = serial.split();

        static mut RX_Q: Queue<u8, RX_Q_SIZE> = Queue::new();
        static mut TX_Q: Queue<u8, TX_Q_SIZE> = Queue::new();

        let (rx_q_producer, rx_q_consumer) = unsafe { RX_Q.split() };
        let (tx_q_producer, tx_q_consumer) = unsafe { TX_Q.split() };

        unsafe {
            RX_Q_PRODUCER = Some(rx_q_producer);
            RX_Q_CONSUMER = Some(rx_q_consumer);
            TX_Q_PRODUCER = Some(tx_q_producer);
            TX_Q_CONSUMER = Some(tx_q_consumer);
            TX = Some(tx);
            RX = Some(rx);

            // Receive interrupt stays on for good; TXE is gated by the queue
            (*pac::USART1::ptr()).cr1.modify(|_, w| w.rxneie().set_bit());

            nvic.set_priority(pac::Interrupt::USART1, irq_prio);
            pac::NVIC::unmask(pac::Interrupt::USART1);
        }
    }

    #[allow(dead_code)]
    pub fn read_byte() -> Option<u8> {
        let rx_q_consumer = unsafe { RX_Q_CONSUMER.as_mut().unwrap_unchecked() };
        rx_q_consumer.dequeue()
    }

    #[allow(dead_code)]
    pub fn write_byte(b: u8) {
        let tx_q_producer = unsafe { TX_Q_PRODUCER.as_mut().unwrap_unchecked() };
        // Drop the byte if the queue is full
        let _ = tx_q_producer.enqueue(b);
        unsafe {
            (*pac::USART1::ptr()).cr1.modify(|_, w| w.txeie().set_bit());
        }
    }

    #[allow(dead_code)]
    pub fn writer() -> Uart1Tx {
        Uart1Tx {}
    }

    #[interrupt]
    fn USART1() {
        let rx = unsafe { RX.as_mut().unwrap_unchecked() };
        let tx = unsafe { TX.as_mut().unwrap_unchecked() };
        let rx_q_producer = unsafe { RX_Q_PRODUCER.as_mut().unwrap_unchecked() };
        let tx_q_consumer = unsafe { TX_Q_CONSUMER.as_mut().unwrap_unchecked() };
        let usart1 = unsafe { &*pac::USART1::ptr() };

        // Read any available bytes from the serial port
        match rx.read() {
            Ok(rxbyte) => {
                rx_q_producer.enqueue(rxbyte).ok();
            }
            Err(_) => (),
        };

        // Check if there is room to transmit a byte
        let sr = usart1.sr.read();
        if sr.txe().bit_is_set() {
            match tx_q_consumer.dequeue() {
                Some(b) => {
                    // If there's a byte available in the Q, send it
                    tx.write(b).ok();
                }
                None => {
                    // If the Q is empty, mask the TXE interrupt. It must be re-enabled when data is written to the queue
                    usart1.cr1.modify(|_, w| w.txeie().clear_bit());
                }
            }
        }
    }
}
